//! Binance combined-stream JSON: topic names, subscribe messages and frame
//! decoding.
//!
//! Every frame on `/stream` is wrapped as `{"stream": "<topic>", "data": ...}`.
//! The topic suffix after the first `@` selects the message type; `!`-prefixed
//! topics cover every symbol and carry either an array or a single record
//! per frame.

use crawl_core::error::DecodeError;
use crawl_core::{MarketType, MessageType, Subscription};
use serde_json::Value;

use crate::adapter::RawFrame;
use crate::json_util;

/// Kline interval names keyed by width in seconds.
const KLINE_INTERVALS: &[(u32, &str)] = &[
    (1, "1s"),
    (60, "1m"),
    (180, "3m"),
    (300, "5m"),
    (900, "15m"),
    (1800, "30m"),
    (3600, "1h"),
    (7200, "2h"),
    (14400, "4h"),
    (21600, "6h"),
    (28800, "8h"),
    (43200, "12h"),
    (86400, "1d"),
    (259200, "3d"),
    (604800, "1w"),
];

pub const SPOT_KLINE_SECONDS: &[u32] =
    &[1, 60, 180, 300, 900, 1800, 3600, 7200, 14400, 21600, 28800, 43200, 86400, 259200, 604800];
pub const FUTURES_KLINE_SECONDS: &[u32] =
    &[60, 180, 300, 900, 1800, 3600, 7200, 14400, 21600, 28800, 43200, 86400, 259200, 604800];

pub fn kline_interval(seconds: u32) -> Option<&'static str> {
    KLINE_INTERVALS.iter().find(|(s, _)| *s == seconds).map(|(_, name)| *name)
}

/// Topic for one subscription, or `None` when Binance has no such stream.
pub fn topic(market_type: MarketType, sub: &Subscription) -> Option<String> {
    let Some(symbol) = sub.symbol.as_deref() else {
        return wildcard_topic(market_type, sub.msg_type).map(str::to_string);
    };
    let lower = symbol.to_lowercase();
    let suffix = match sub.msg_type {
        MessageType::Trade => "aggTrade".to_string(),
        MessageType::L2Event => "depth@100ms".to_string(),
        MessageType::L2TopK => "depth5".to_string(),
        MessageType::Bbo => "bookTicker".to_string(),
        MessageType::Ticker => "ticker".to_string(),
        MessageType::FundingRate => "markPrice".to_string(),
        MessageType::Candlestick => format!("kline_{}", kline_interval(sub.interval?)?),
        _ => return None,
    };
    Some(format!("{lower}@{suffix}"))
}

/// All-symbols topics Binance serves natively.
pub fn wildcard_topic(market_type: MarketType, msg_type: MessageType) -> Option<&'static str> {
    match msg_type {
        MessageType::Ticker => Some("!ticker@arr"),
        MessageType::FundingRate if market_type.is_swap() => Some("!markPrice@arr"),
        MessageType::Bbo if market_type != MarketType::Spot => Some("!bookTicker"),
        _ => None,
    }
}

pub fn build_subscribe(params: &[String], id: u64) -> String {
    serde_json::json!({
        "method": "SUBSCRIBE",
        "params": params,
        "id": id
    })
    .to_string()
}

/// Message type carried by a topic suffix (the part after the symbol).
fn msg_type_of(suffix: &str) -> Option<MessageType> {
    let head = suffix.split('@').next().unwrap_or(suffix);
    match head {
        "aggTrade" | "trade" => Some(MessageType::Trade),
        "depth" => Some(MessageType::L2Event),
        "depth5" | "depth10" | "depth20" => Some(MessageType::L2TopK),
        "bookTicker" => Some(MessageType::Bbo),
        "ticker" => Some(MessageType::Ticker),
        "markPrice" => Some(MessageType::FundingRate),
        _ if head.starts_with("kline_") => Some(MessageType::Candlestick),
        _ => None,
    }
}

/// Split one combined-stream frame into records.
///
/// Subscription acks (`{"result":null,"id":1}`) decode to nothing; error
/// replies become [`DecodeError::Exchange`].
pub fn parse_message(frame: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
    let v = json_util::parse(frame)?;

    if let Some(err) = v.get("error") {
        return Err(DecodeError::Exchange(err.to_string()));
    }
    if v.get("result").is_some() && v.get("id").is_some() {
        return Ok(Vec::new());
    }

    let stream = json_util::str_field(&v, "stream")?;
    let data = v.get("data").ok_or(DecodeError::MissingField("data"))?;

    let (topic_symbol, suffix) = match stream.strip_prefix('!') {
        Some(rest) => (None, rest),
        None => {
            let (symbol, suffix) = stream.split_once('@').ok_or_else(|| DecodeError::UnknownChannel(stream.to_string()))?;
            (Some(symbol), suffix)
        }
    };
    let msg_type = msg_type_of(suffix).ok_or_else(|| DecodeError::UnknownChannel(stream.to_string()))?;

    let record = |item: &Value| -> Result<RawFrame, DecodeError> {
        let symbol = match item.get("s").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => topic_symbol.ok_or(DecodeError::MissingField("s"))?.to_string(),
        };
        Ok(RawFrame { msg_type, symbol, payload: item.clone() })
    };

    match data {
        Value::Array(items) => items.iter().map(record).collect(),
        item => Ok(vec![record(item)?]),
    }
}

/// Tradable symbols from an `exchangeInfo` response.
pub fn parse_exchange_info(market_type: MarketType, body: &[u8]) -> Result<Vec<String>, DecodeError> {
    let v = json_util::parse(body)?;
    let symbols = json_util::array_field(&v, "symbols")?;

    let wanted_contract = |contract: Option<&str>| match market_type {
        MarketType::Spot => true,
        MarketType::LinearSwap | MarketType::InverseSwap => contract == Some("PERPETUAL"),
        _ => matches!(contract, Some(c) if c != "PERPETUAL" && !c.is_empty()),
    };

    Ok(symbols
        .iter()
        .filter(|s| {
            let status = s.get("status").or_else(|| s.get("contractStatus")).and_then(Value::as_str);
            status == Some("TRADING")
        })
        .filter(|s| wanted_contract(s.get("contractType").and_then(Value::as_str)))
        .filter_map(|s| s.get("symbol").and_then(Value::as_str).map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics() {
        let trade = Subscription::new("BTCUSDT", MessageType::Trade);
        assert_eq!(topic(MarketType::Spot, &trade).as_deref(), Some("btcusdt@aggTrade"));
        let kline = Subscription::candlestick("ETHUSDT", 300);
        assert_eq!(topic(MarketType::LinearSwap, &kline).as_deref(), Some("ethusdt@kline_5m"));
        assert_eq!(topic(MarketType::Spot, &Subscription::candlestick("ETHUSDT", 7)), None);
        assert_eq!(topic(MarketType::Spot, &Subscription::all(MessageType::Ticker)).as_deref(), Some("!ticker@arr"));
        assert_eq!(topic(MarketType::Spot, &Subscription::all(MessageType::Bbo)), None);
    }

    #[test]
    fn parse_agg_trade() {
        let frame = br#"{"stream":"btcusdt@aggTrade","data":{"e":"aggTrade","E":1672515782136,"s":"BTCUSDT","a":123456789,"p":"16500.50","q":"0.001","f":100,"l":105,"T":1672515782136,"m":true}}"#;
        let raws = parse_message(frame).unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].msg_type, MessageType::Trade);
        assert_eq!(raws[0].symbol, "BTCUSDT");
        assert_eq!(raws[0].payload["p"], "16500.50");
    }

    #[test]
    fn parse_partial_depth_uses_topic_symbol() {
        let frame = br#"{"stream":"btcusdt@depth5","data":{"lastUpdateId":1,"bids":[["1","2"]],"asks":[]}}"#;
        let raws = parse_message(frame).unwrap();
        assert_eq!(raws[0].msg_type, MessageType::L2TopK);
        assert_eq!(raws[0].symbol, "btcusdt");
    }

    #[test]
    fn parse_ticker_array_in_order() {
        let frame = br#"{"stream":"!ticker@arr","data":[{"e":"24hrTicker","s":"BTCUSDT"},{"e":"24hrTicker","s":"ETHUSDT"}]}"#;
        let raws = parse_message(frame).unwrap();
        let symbols: Vec<&str> = raws.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert!(raws.iter().all(|r| r.msg_type == MessageType::Ticker));
    }

    #[test]
    fn parse_depth_and_kline() {
        let depth = br#"{"stream":"btcusdt@depth@100ms","data":{"e":"depthUpdate","s":"BTCUSDT","U":1,"u":2,"b":[],"a":[]}}"#;
        assert_eq!(parse_message(depth).unwrap()[0].msg_type, MessageType::L2Event);
        let kline = br#"{"stream":"btcusdt@kline_1m","data":{"e":"kline","s":"BTCUSDT","k":{"i":"1m"}}}"#;
        assert_eq!(parse_message(kline).unwrap()[0].msg_type, MessageType::Candlestick);
    }

    #[test]
    fn acks_and_errors() {
        assert!(parse_message(br#"{"result":null,"id":1}"#).unwrap().is_empty());
        assert!(matches!(
            parse_message(br#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#),
            Err(DecodeError::Exchange(_))
        ));
        assert!(matches!(
            parse_message(br#"{"stream":"btcusdt@mystery","data":{}}"#),
            Err(DecodeError::UnknownChannel(_))
        ));
    }

    #[test]
    fn exchange_info_filters() {
        let body = br#"{"symbols":[
            {"symbol":"BTCUSDT","status":"TRADING","contractType":"PERPETUAL"},
            {"symbol":"BTCUSDT_250328","status":"TRADING","contractType":"CURRENT_QUARTER"},
            {"symbol":"OLDUSDT","status":"SETTLING","contractType":"PERPETUAL"}
        ]}"#;
        assert_eq!(parse_exchange_info(MarketType::LinearSwap, body).unwrap(), vec!["BTCUSDT"]);
        assert_eq!(parse_exchange_info(MarketType::LinearFuture, body).unwrap(), vec!["BTCUSDT_250328"]);

        let spot = br#"{"symbols":[{"symbol":"ETHBTC","status":"TRADING"},{"symbol":"XBTC","status":"BREAK"}]}"#;
        assert_eq!(parse_exchange_info(MarketType::Spot, spot).unwrap(), vec!["ETHBTC"]);
    }
}
