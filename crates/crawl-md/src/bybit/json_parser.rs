//! Bybit v5 public stream parser.
//!
//! Frames carry a dotted `topic` (`publicTrade.BTCUSDT`,
//! `orderbook.50.BTCUSDT`, `kline.1.BTCUSDT`) whose last segment is the
//! symbol. Trade and kline frames bundle an array of records; order-book and
//! ticker frames hold one object and keep their `type` (snapshot / delta).

use crawl_core::error::DecodeError;
use crawl_core::{MarketType, MessageType, Subscription};
use serde_json::{Value, json};

use crate::adapter::RawFrame;
use crate::json_util;

/// Kline interval names keyed by width in seconds.
const KLINE_INTERVALS: &[(u32, &str)] = &[
    (60, "1"),
    (180, "3"),
    (300, "5"),
    (900, "15"),
    (1800, "30"),
    (3600, "60"),
    (7200, "120"),
    (14400, "240"),
    (21600, "360"),
    (43200, "720"),
    (86400, "D"),
    (604800, "W"),
];

pub const KLINE_SECONDS: &[u32] = &[60, 180, 300, 900, 1800, 3600, 7200, 14400, 21600, 43200, 86400, 604800];

pub fn kline_interval(seconds: u32) -> Option<&'static str> {
    KLINE_INTERVALS.iter().find(|(s, _)| *s == seconds).map(|(_, name)| *name)
}

/// REST `category` for a market.
pub fn category(market_type: MarketType) -> Option<&'static str> {
    match market_type {
        MarketType::Spot => Some("spot"),
        MarketType::LinearSwap | MarketType::LinearFuture => Some("linear"),
        MarketType::InverseSwap | MarketType::InverseFuture => Some("inverse"),
        _ => None,
    }
}

pub fn topic(sub: &Subscription) -> Option<String> {
    let symbol = sub.symbol.as_deref()?;
    let prefix = match sub.msg_type {
        MessageType::Trade => "publicTrade".to_string(),
        MessageType::L2Event => "orderbook.50".to_string(),
        MessageType::Bbo => "orderbook.1".to_string(),
        MessageType::Ticker => "tickers".to_string(),
        MessageType::Candlestick => format!("kline.{}", kline_interval(sub.interval?)?),
        _ => return None,
    };
    Some(format!("{prefix}.{symbol}"))
}

fn msg_type_of(topic: &str) -> Option<MessageType> {
    let mut parts = topic.split('.');
    match (parts.next()?, parts.next()?) {
        ("publicTrade", _) => Some(MessageType::Trade),
        ("orderbook", "1") => Some(MessageType::Bbo),
        ("orderbook", _) => Some(MessageType::L2Event),
        ("tickers", _) => Some(MessageType::Ticker),
        ("kline", _) => Some(MessageType::Candlestick),
        _ => None,
    }
}

pub fn build_subscribe(topics: &[String]) -> String {
    json!({
        "op": "subscribe",
        "args": topics
    })
    .to_string()
}

/// Split one frame into records.
pub fn parse_message(frame: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
    let v = json_util::parse(frame)?;

    // Replies to our own requests: {"success":true,"op":"subscribe"}, pongs.
    if v.get("op").is_some() {
        if v.get("success").and_then(Value::as_bool) == Some(false) {
            let msg = json_util::text_field(&v, "ret_msg").unwrap_or_default();
            return Err(DecodeError::Exchange(msg));
        }
        return Ok(Vec::new());
    }

    let topic = json_util::str_field(&v, "topic")?;
    let msg_type = msg_type_of(topic).ok_or_else(|| DecodeError::UnknownChannel(topic.to_string()))?;
    let topic_symbol = topic.rsplit('.').next().unwrap_or(topic);
    let data = v.get("data").ok_or(DecodeError::MissingField("data"))?;

    match data {
        Value::Array(items) => Ok(items
            .iter()
            .map(|item| {
                let symbol = item.get("s").and_then(Value::as_str).unwrap_or(topic_symbol);
                RawFrame { msg_type, symbol: symbol.to_string(), payload: item.clone() }
            })
            .collect()),
        item => {
            let mut payload = item.clone();
            for key in ["type", "ts", "cts"] {
                if let Some(extra) = v.get(key) {
                    payload = json_util::with_field(&payload, key, extra.clone());
                }
            }
            Ok(vec![RawFrame { msg_type, symbol: topic_symbol.to_string(), payload }])
        }
    }
}

/// Check the `{"retCode":0,"result":{...}}` REST envelope and return `result`.
pub fn rest_result(body: &[u8]) -> Result<Value, DecodeError> {
    let mut v = json_util::parse(body)?;
    let code = v.get("retCode").and_then(Value::as_i64).ok_or(DecodeError::MissingField("retCode"))?;
    if code != 0 {
        let msg = json_util::text_field(&v, "retMsg").unwrap_or_default();
        return Err(DecodeError::Exchange(format!("{code} {msg}")));
    }
    v.get_mut("result").map(Value::take).ok_or(DecodeError::MissingField("result"))
}

/// Trading symbols from `/v5/market/instruments-info`.
pub fn parse_instruments(market_type: MarketType, body: &[u8]) -> Result<Vec<String>, DecodeError> {
    let result = rest_result(body)?;
    let list = json_util::array_field(&result, "list")?;

    let wanted = |contract: Option<&str>| match market_type {
        MarketType::Spot => true,
        MarketType::LinearSwap => contract == Some("LinearPerpetual"),
        MarketType::LinearFuture => contract == Some("LinearFutures"),
        MarketType::InverseSwap => contract == Some("InversePerpetual"),
        MarketType::InverseFuture => contract == Some("InverseFutures"),
        _ => false,
    };

    Ok(list
        .iter()
        .filter(|i| i.get("status").and_then(Value::as_str) == Some("Trading"))
        .filter(|i| wanted(i.get("contractType").and_then(Value::as_str)))
        .filter_map(|i| i.get("symbol").and_then(Value::as_str).map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics() {
        assert_eq!(topic(&Subscription::new("BTCUSDT", MessageType::Trade)).as_deref(), Some("publicTrade.BTCUSDT"));
        assert_eq!(topic(&Subscription::new("BTCUSDT", MessageType::Bbo)).as_deref(), Some("orderbook.1.BTCUSDT"));
        assert_eq!(topic(&Subscription::candlestick("BTCUSDT", 86400)).as_deref(), Some("kline.D.BTCUSDT"));
        assert_eq!(topic(&Subscription::all(MessageType::Trade)), None);
    }

    #[test]
    fn trades_split_in_order() {
        let frame = br#"{"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":1672304486868,"data":[
            {"T":1672304486865,"s":"BTCUSDT","S":"Buy","v":"0.001","p":"16578.50","i":"a"},
            {"T":1672304486866,"s":"BTCUSDT","S":"Sell","v":"0.002","p":"16578.00","i":"b"}
        ]}"#;
        let raws = parse_message(frame).unwrap();
        assert_eq!(raws.len(), 2);
        assert_eq!(raws[0].payload["i"], "a");
        assert_eq!(raws[1].payload["i"], "b");
        assert_eq!(raws[0].msg_type, MessageType::Trade);
    }

    #[test]
    fn orderbook_keeps_envelope() {
        let frame = br#"{"topic":"orderbook.50.BTCUSDT","type":"delta","ts":1687940967466,"data":{"s":"BTCUSDT","b":[["30247.20","30.028"]],"a":[],"u":177400507,"seq":66544703342},"cts":1687940967464}"#;
        let raws = parse_message(frame).unwrap();
        assert_eq!(raws[0].msg_type, MessageType::L2Event);
        assert_eq!(raws[0].symbol, "BTCUSDT");
        assert_eq!(raws[0].payload["type"], "delta");
        assert_eq!(raws[0].payload["u"], 177400507);

        let bbo = br#"{"topic":"orderbook.1.ETHUSDT","type":"snapshot","ts":1,"data":{"s":"ETHUSDT","b":[],"a":[],"u":1}}"#;
        assert_eq!(parse_message(bbo).unwrap()[0].msg_type, MessageType::Bbo);
    }

    #[test]
    fn kline_symbol_from_topic() {
        let frame = br#"{"topic":"kline.5.BTCUSDT","type":"snapshot","ts":1,"data":[{"start":1,"end":2,"interval":"5","open":"1","close":"2","confirm":false}]}"#;
        let raws = parse_message(frame).unwrap();
        assert_eq!(raws[0].msg_type, MessageType::Candlestick);
        assert_eq!(raws[0].symbol, "BTCUSDT");
    }

    #[test]
    fn control_frames() {
        assert!(parse_message(br#"{"success":true,"ret_msg":"","conn_id":"x","op":"subscribe"}"#).unwrap().is_empty());
        assert!(parse_message(br#"{"success":true,"ret_msg":"pong","conn_id":"x","op":"ping"}"#).unwrap().is_empty());
        assert!(matches!(
            parse_message(br#"{"success":false,"ret_msg":"error:handler not found","op":"subscribe"}"#),
            Err(DecodeError::Exchange(_))
        ));
    }

    #[test]
    fn instruments() {
        let body = br#"{"retCode":0,"retMsg":"OK","result":{"category":"linear","list":[
            {"symbol":"BTCUSDT","contractType":"LinearPerpetual","status":"Trading"},
            {"symbol":"BTC-27DEC24","contractType":"LinearFutures","status":"Trading"},
            {"symbol":"OLDUSDT","contractType":"LinearPerpetual","status":"Closed"}
        ]}}"#;
        assert_eq!(parse_instruments(MarketType::LinearSwap, body).unwrap(), vec!["BTCUSDT"]);
        assert_eq!(parse_instruments(MarketType::LinearFuture, body).unwrap(), vec!["BTC-27DEC24"]);
        assert!(matches!(
            rest_result(br#"{"retCode":10001,"retMsg":"params error","result":{}}"#),
            Err(DecodeError::Exchange(_))
        ));
    }
}
