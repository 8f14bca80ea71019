//! OKX adapter.
//!
//! Public market channels live on `/ws/v5/public`; candles moved to
//! `/ws/v5/business`. OKX drops idle connections after 30 s, so a text
//! `"ping"` is sent every 25 s. Open interest has a bulk REST endpoint per
//! instrument type, so "all symbols" needs no discovery there.

pub mod json_parser;

use std::time::Duration;

use async_trait::async_trait;
use crawl_core::error::DecodeError;
use crawl_core::transport::WireMessage;
use crawl_core::ws::PingPayload;
use crawl_core::{MarketType, MessageType, Subscription};

use crate::adapter::{CapabilityDescriptor, Delivery, ExchangeAdapter, PollRequest, RawFrame, StreamEndpoint};

const PUBLIC_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";
const BUSINESS_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/business";
const REST_BASE: &str = "https://www.okx.com/api/v5";

const PING_INTERVAL: Duration = Duration::from_secs(25);
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);
const OPEN_INTEREST_INTERVAL: Duration = Duration::from_secs(60);

/// Arguments per subscribe request.
const SUBSCRIBE_BATCH: usize = 100;

const STREAMED: [MessageType; 6] = [
    MessageType::Trade,
    MessageType::L2Event,
    MessageType::L2TopK,
    MessageType::Bbo,
    MessageType::Ticker,
    MessageType::Candlestick,
];
const SWAPS: [MarketType; 2] = [MarketType::LinearSwap, MarketType::InverseSwap];
const CONTRACTS: [MarketType; 4] =
    [MarketType::LinearSwap, MarketType::InverseSwap, MarketType::LinearFuture, MarketType::InverseFuture];

pub struct OkxAdapter {
    caps: CapabilityDescriptor,
}

impl Default for OkxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OkxAdapter {
    pub fn new() -> Self {
        let caps = CapabilityDescriptor::new()
            .with(&[MarketType::Spot], &STREAMED, Delivery::Stream)
            .with(&CONTRACTS, &STREAMED, Delivery::Stream)
            .with(&SWAPS, &[MessageType::FundingRate], Delivery::Stream)
            .with(&[MarketType::EuropeanOption], &[MessageType::Trade, MessageType::Ticker], Delivery::Stream)
            .with(&[MarketType::Spot], &[MessageType::L2Snapshot], Delivery::Poll { interval: SNAPSHOT_INTERVAL })
            .with(&CONTRACTS, &[MessageType::L2Snapshot], Delivery::Poll { interval: SNAPSHOT_INTERVAL })
            .with(&CONTRACTS, &[MessageType::OpenInterest], Delivery::Poll { interval: OPEN_INTEREST_INTERVAL });
        Self { caps }
    }
}

#[async_trait]
impl ExchangeAdapter for OkxAdapter {
    fn exchange(&self) -> &str {
        "okx"
    }

    fn capabilities(&self) -> &CapabilityDescriptor {
        &self.caps
    }

    fn stream_endpoint(&self, _market_type: MarketType, msg_type: MessageType) -> Option<StreamEndpoint> {
        let url = match msg_type {
            MessageType::Candlestick => BUSINESS_WS_URL,
            _ => PUBLIC_WS_URL,
        };
        Some(StreamEndpoint::new(url).with_ping(PING_INTERVAL, PingPayload::Text("ping".into())))
    }

    fn candlestick_intervals(&self, _market_type: MarketType) -> &'static [u32] {
        json_parser::BAR_SECONDS
    }

    fn build_subscription_request(&self, _market_type: MarketType, subscriptions: &[Subscription]) -> Vec<WireMessage> {
        let args: Vec<(String, String)> = subscriptions
            .iter()
            .filter_map(|s| Some((json_parser::channel(s)?, s.symbol.clone()?)))
            .collect();
        args.chunks(SUBSCRIBE_BATCH).map(|batch| WireMessage::Text(json_parser::build_subscribe(batch))).collect()
    }

    fn decode_frame(&self, _market_type: MarketType, frame: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
        json_parser::parse_message(frame)
    }

    fn poll_request(&self, market_type: MarketType, subscription: &Subscription) -> Option<PollRequest> {
        let (url, symbol) = match (subscription.msg_type, subscription.symbol.as_deref()) {
            (MessageType::L2Snapshot, Some(symbol)) => {
                (format!("{REST_BASE}/market/books?instId={symbol}&sz=400"), Some(symbol.to_string()))
            }
            (MessageType::OpenInterest, Some(symbol)) => (
                format!("{REST_BASE}/public/open-interest?instType={}&instId={symbol}", json_parser::inst_type(market_type)?),
                Some(symbol.to_string()),
            ),
            (MessageType::OpenInterest, None) => {
                (format!("{REST_BASE}/public/open-interest?instType={}", json_parser::inst_type(market_type)?), None)
            }
            _ => return None,
        };
        Some(PollRequest { url, msg_type: subscription.msg_type, symbol })
    }

    /// Books and open interest both come in the `{"code","data":[...]}`
    /// envelope; each `data` element is one record.
    fn decode_poll(&self, market_type: MarketType, request: &PollRequest, body: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
        let data = json_parser::rest_data(body)?;
        let mut out = Vec::with_capacity(data.len());
        for item in data {
            let symbol = match (&request.symbol, item.get("instId").and_then(serde_json::Value::as_str)) {
                (Some(symbol), _) => symbol.clone(),
                (None, Some(inst_id)) if json_parser::inst_matches(market_type, inst_id) => inst_id.to_string(),
                (None, Some(_)) => continue,
                (None, None) => return Err(DecodeError::MissingField("instId")),
            };
            out.push(RawFrame { msg_type: request.msg_type, symbol, payload: item });
        }
        Ok(out)
    }

    fn symbols_request(&self, market_type: MarketType) -> Option<String> {
        // Option listings need an underlying; not enumerated here.
        if market_type == MarketType::EuropeanOption {
            return None;
        }
        Some(format!("{REST_BASE}/public/instruments?instType={}", json_parser::inst_type(market_type)?))
    }

    fn parse_symbols(&self, market_type: MarketType, body: &[u8]) -> Result<Vec<String>, DecodeError> {
        json_parser::parse_instruments(market_type, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candles_use_business_endpoint() {
        let adapter = OkxAdapter::new();
        let candle = adapter.stream_endpoint(MarketType::Spot, MessageType::Candlestick).unwrap();
        let trade = adapter.stream_endpoint(MarketType::Spot, MessageType::Trade).unwrap();
        assert_eq!(candle.url, BUSINESS_WS_URL);
        assert_eq!(trade.url, PUBLIC_WS_URL);
        let ping = trade.ping.unwrap();
        assert_eq!(ping.interval, PING_INTERVAL);
        assert_eq!(ping.payload.to_wire(), WireMessage::Text("ping".into()));
    }

    #[test]
    fn subscribe_args() {
        let adapter = OkxAdapter::new();
        let subs = vec![Subscription::new("BTC-USDT", MessageType::Trade), Subscription::candlestick("BTC-USDT", 60)];
        let msgs = adapter.build_subscription_request(MarketType::Spot, &subs);
        assert_eq!(msgs.len(), 1);
        let WireMessage::Text(text) = &msgs[0] else { panic!("expected text") };
        let v: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(v["op"], "subscribe");
        assert_eq!(v["args"][0], serde_json::json!({"channel": "trades", "instId": "BTC-USDT"}));
        assert_eq!(v["args"][1], serde_json::json!({"channel": "candle1m", "instId": "BTC-USDT"}));
    }

    #[test]
    fn bulk_open_interest_split_by_contract_type() {
        let adapter = OkxAdapter::new();
        let req = adapter.poll_request(MarketType::LinearSwap, &Subscription::all(MessageType::OpenInterest)).unwrap();
        assert_eq!(req.url, "https://www.okx.com/api/v5/public/open-interest?instType=SWAP");
        assert_eq!(req.symbol, None);

        let body = br#"{"code":"0","msg":"","data":[
            {"instId":"BTC-USDT-SWAP","instType":"SWAP","oi":"5000","ts":"1"},
            {"instId":"BTC-USD-SWAP","instType":"SWAP","oi":"900","ts":"1"},
            {"instId":"ETH-USDT-SWAP","instType":"SWAP","oi":"7000","ts":"1"}
        ]}"#;
        let raws = adapter.decode_poll(MarketType::LinearSwap, &req, body).unwrap();
        let symbols: Vec<&str> = raws.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC-USDT-SWAP", "ETH-USDT-SWAP"]);
    }

    #[test]
    fn snapshot_poll() {
        let adapter = OkxAdapter::new();
        let req = adapter.poll_request(MarketType::Spot, &Subscription::new("BTC-USDT", MessageType::L2Snapshot)).unwrap();
        let body = br#"{"code":"0","msg":"","data":[{"asks":[["41006.8","0.6","0","1"]],"bids":[],"ts":"1"}]}"#;
        let raws = adapter.decode_poll(MarketType::Spot, &req, body).unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].symbol, "BTC-USDT");
        assert!(adapter.poll_request(MarketType::Spot, &Subscription::all(MessageType::L2Snapshot)).is_none());
    }

    #[test]
    fn options_have_no_listing() {
        let adapter = OkxAdapter::new();
        assert!(adapter.symbols_request(MarketType::EuropeanOption).is_none());
        assert!(adapter.symbols_request(MarketType::Spot).unwrap().ends_with("instType=SPOT"));
    }
}
