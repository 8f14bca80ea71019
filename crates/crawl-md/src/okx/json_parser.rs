//! OKX v5 JSON parser.
//!
//! Data frames look like
//! `{"arg":{"channel":"trades","instId":"BTC-USDT"},"data":[...]}` and may
//! bundle several records; each element of `data` becomes one record, in
//! order. Order-book channels add an `action` (`snapshot` / `update`) that is
//! copied onto each record.

use crawl_core::error::DecodeError;
use crawl_core::{MarketType, MessageType, Subscription};
use serde_json::{Value, json};

use crate::adapter::RawFrame;
use crate::json_util;

/// Candle bar names keyed by width in seconds.
const BARS: &[(u32, &str)] = &[
    (60, "1m"),
    (180, "3m"),
    (300, "5m"),
    (900, "15m"),
    (1800, "30m"),
    (3600, "1H"),
    (7200, "2H"),
    (14400, "4H"),
    (21600, "6H"),
    (43200, "12H"),
    (86400, "1D"),
    (604800, "1W"),
];

pub const BAR_SECONDS: &[u32] = &[60, 180, 300, 900, 1800, 3600, 7200, 14400, 21600, 43200, 86400, 604800];

pub fn bar(seconds: u32) -> Option<&'static str> {
    BARS.iter().find(|(s, _)| *s == seconds).map(|(_, name)| *name)
}

/// `instType` query value for a market.
pub fn inst_type(market_type: MarketType) -> Option<&'static str> {
    match market_type {
        MarketType::Spot => Some("SPOT"),
        MarketType::LinearSwap | MarketType::InverseSwap => Some("SWAP"),
        MarketType::LinearFuture | MarketType::InverseFuture => Some("FUTURES"),
        MarketType::EuropeanOption => Some("OPTION"),
        _ => None,
    }
}

pub fn channel(sub: &Subscription) -> Option<String> {
    let name = match sub.msg_type {
        MessageType::Trade => "trades".to_string(),
        MessageType::L2Event => "books".to_string(),
        MessageType::L2TopK => "books5".to_string(),
        MessageType::Bbo => "bbo-tbt".to_string(),
        MessageType::Ticker => "tickers".to_string(),
        MessageType::FundingRate => "funding-rate".to_string(),
        MessageType::Candlestick => format!("candle{}", bar(sub.interval?)?),
        _ => return None,
    };
    Some(name)
}

fn msg_type_of(channel: &str) -> Option<MessageType> {
    match channel {
        "trades" | "trades-all" => Some(MessageType::Trade),
        "books" | "books-l2-tbt" | "books50-l2-tbt" => Some(MessageType::L2Event),
        "books5" => Some(MessageType::L2TopK),
        "bbo-tbt" => Some(MessageType::Bbo),
        "tickers" => Some(MessageType::Ticker),
        "funding-rate" => Some(MessageType::FundingRate),
        c if c.starts_with("candle") => Some(MessageType::Candlestick),
        _ => None,
    }
}

/// Subscribe message for a batch of `(channel, instId)` arguments.
pub fn build_subscribe(args: &[(String, String)]) -> String {
    let args: Vec<Value> = args.iter().map(|(channel, inst_id)| json!({"channel": channel, "instId": inst_id})).collect();
    json!({
        "op": "subscribe",
        "args": args
    })
    .to_string()
}

/// Split one WebSocket frame into records.
pub fn parse_message(frame: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
    // OKX answers our "ping" with a bare "pong".
    if frame == b"pong" {
        return Ok(Vec::new());
    }

    let v = json_util::parse(frame)?;

    if let Some(event) = v.get("event").and_then(Value::as_str) {
        return match event {
            "error" => Err(DecodeError::Exchange(format!(
                "{} {}",
                json_util::text_field(&v, "code").unwrap_or_default(),
                json_util::text_field(&v, "msg").unwrap_or_default()
            ))),
            _ => Ok(Vec::new()),
        };
    }

    let arg = v.get("arg").ok_or(DecodeError::MissingField("arg"))?;
    let channel = json_util::str_field(arg, "channel")?;
    let inst_id = json_util::str_field(arg, "instId")?;
    let msg_type = msg_type_of(channel).ok_or_else(|| DecodeError::UnknownChannel(channel.to_string()))?;
    let data = json_util::array_field(&v, "data")?;
    let action = v.get("action").cloned();

    Ok(data
        .iter()
        .map(|item| {
            let payload = match &action {
                Some(action) => json_util::with_field(item, "action", action.clone()),
                None => item.clone(),
            };
            RawFrame { msg_type, symbol: inst_id.to_string(), payload }
        })
        .collect())
}

/// Check the `{"code":"0","data":[...]}` REST envelope and return `data`.
pub fn rest_data(body: &[u8]) -> Result<Vec<Value>, DecodeError> {
    let v = json_util::parse(body)?;
    let code = json_util::text_field(&v, "code").unwrap_or_default();
    if code != "0" {
        let msg = json_util::text_field(&v, "msg").unwrap_or_default();
        return Err(DecodeError::Exchange(format!("{code} {msg}")));
    }
    Ok(json_util::array_field(&v, "data")?.clone())
}

/// Live instruments of `market_type` from `/public/instruments`.
pub fn parse_instruments(market_type: MarketType, body: &[u8]) -> Result<Vec<String>, DecodeError> {
    let wanted_ct = match market_type {
        MarketType::LinearSwap | MarketType::LinearFuture => Some("linear"),
        MarketType::InverseSwap | MarketType::InverseFuture => Some("inverse"),
        _ => None,
    };
    Ok(rest_data(body)?
        .iter()
        .filter(|i| i.get("state").and_then(Value::as_str) == Some("live"))
        .filter(|i| wanted_ct.is_none_or(|ct| i.get("ctType").and_then(Value::as_str) == Some(ct)))
        .filter_map(|i| i.get("instId").and_then(Value::as_str).map(str::to_string))
        .collect())
}

/// Whether an instrument id belongs to `market_type` (used to split bulk
/// open-interest responses that mix linear and inverse contracts).
pub fn inst_matches(market_type: MarketType, inst_id: &str) -> bool {
    // Inverse contracts are quoted in USD, linear ones in USDT or USDC.
    let quote = inst_id.split('-').nth(1).unwrap_or_default();
    match market_type {
        MarketType::LinearSwap | MarketType::LinearFuture => quote != "USD",
        MarketType::InverseSwap | MarketType::InverseFuture => quote == "USD",
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels() {
        assert_eq!(channel(&Subscription::new("BTC-USDT", MessageType::Bbo)).as_deref(), Some("bbo-tbt"));
        assert_eq!(channel(&Subscription::candlestick("BTC-USDT", 3600)).as_deref(), Some("candle1H"));
        assert_eq!(channel(&Subscription::candlestick("BTC-USDT", 61)), None);
        assert_eq!(channel(&Subscription::new("BTC-USDT", MessageType::L3Event)), None);
    }

    #[test]
    fn bundled_trades_split_in_order() {
        let frame = br#"{"arg":{"channel":"trades","instId":"BTC-USDT"},"data":[
            {"instId":"BTC-USDT","tradeId":"1","px":"42219.9","sz":"0.1","side":"buy","ts":"1630048897897"},
            {"instId":"BTC-USDT","tradeId":"2","px":"42220.0","sz":"0.2","side":"sell","ts":"1630048897898"}
        ]}"#;
        let raws = parse_message(frame).unwrap();
        assert_eq!(raws.len(), 2);
        assert_eq!(raws[0].payload["tradeId"], "1");
        assert_eq!(raws[1].payload["tradeId"], "2");
        assert!(raws.iter().all(|r| r.symbol == "BTC-USDT" && r.msg_type == MessageType::Trade));
    }

    #[test]
    fn book_action_kept() {
        let frame = br#"{"arg":{"channel":"books","instId":"BTC-USDT-SWAP"},"action":"snapshot","data":[{"asks":[],"bids":[],"ts":"1","checksum":0}]}"#;
        let raws = parse_message(frame).unwrap();
        assert_eq!(raws[0].msg_type, MessageType::L2Event);
        assert_eq!(raws[0].payload["action"], "snapshot");
    }

    #[test]
    fn control_frames() {
        assert!(parse_message(b"pong").unwrap().is_empty());
        assert!(parse_message(br#"{"event":"subscribe","arg":{"channel":"trades","instId":"BTC-USDT"}}"#).unwrap().is_empty());
        let err = parse_message(br#"{"event":"error","code":"60012","msg":"Invalid request"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Exchange(m) if m.contains("60012")));
    }

    #[test]
    fn instruments_filtered_by_contract_type() {
        let body = br#"{"code":"0","msg":"","data":[
            {"instId":"BTC-USDT-SWAP","ctType":"linear","state":"live"},
            {"instId":"BTC-USD-SWAP","ctType":"inverse","state":"live"},
            {"instId":"OLD-USDT-SWAP","ctType":"linear","state":"suspend"}
        ]}"#;
        assert_eq!(parse_instruments(MarketType::LinearSwap, body).unwrap(), vec!["BTC-USDT-SWAP"]);
        assert_eq!(parse_instruments(MarketType::InverseSwap, body).unwrap(), vec!["BTC-USD-SWAP"]);
        assert!(matches!(
            parse_instruments(MarketType::Spot, br#"{"code":"50011","msg":"Too Many Requests","data":[]}"#),
            Err(DecodeError::Exchange(_))
        ));
    }

    #[test]
    fn linear_inverse_split() {
        assert!(inst_matches(MarketType::LinearSwap, "BTC-USDT-SWAP"));
        assert!(!inst_matches(MarketType::LinearSwap, "BTC-USD-SWAP"));
        assert!(inst_matches(MarketType::InverseFuture, "BTC-USD-250328"));
    }
}
