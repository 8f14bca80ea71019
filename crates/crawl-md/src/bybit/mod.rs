//! Bybit adapter.
//!
//! One v5 public endpoint per category (`spot`, `linear`, `inverse`). Bybit
//! closes connections that stay silent for 20 s and accepts at most 10 topics
//! per subscribe request, so subscriptions go out in batches of 10 and a JSON
//! ping is sent every 20 s.

pub mod json_parser;

use std::time::Duration;

use async_trait::async_trait;
use crawl_core::error::DecodeError;
use crawl_core::transport::WireMessage;
use crawl_core::ws::PingPayload;
use crawl_core::{MarketType, MessageType, Subscription};

use crate::adapter::{CapabilityDescriptor, Delivery, ExchangeAdapter, PollRequest, RawFrame, StreamEndpoint};

const WS_BASE: &str = "wss://stream.bybit.com/v5/public";
const REST_BASE: &str = "https://api.bybit.com/v5/market";

const PING_INTERVAL: Duration = Duration::from_secs(20);
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);
const OPEN_INTEREST_INTERVAL: Duration = Duration::from_secs(60);

/// Topics per subscribe request.
const SUBSCRIBE_BATCH: usize = 10;

const STREAMED: [MessageType; 5] =
    [MessageType::Trade, MessageType::L2Event, MessageType::Bbo, MessageType::Ticker, MessageType::Candlestick];
const CONTRACTS: [MarketType; 4] =
    [MarketType::LinearSwap, MarketType::LinearFuture, MarketType::InverseSwap, MarketType::InverseFuture];

pub struct BybitAdapter {
    caps: CapabilityDescriptor,
}

impl Default for BybitAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BybitAdapter {
    pub fn new() -> Self {
        let caps = CapabilityDescriptor::new()
            .with(&[MarketType::Spot], &STREAMED, Delivery::Stream)
            .with(&CONTRACTS, &STREAMED, Delivery::Stream)
            .with(&[MarketType::Spot], &[MessageType::L2Snapshot], Delivery::Poll { interval: SNAPSHOT_INTERVAL })
            .with(&CONTRACTS, &[MessageType::L2Snapshot], Delivery::Poll { interval: SNAPSHOT_INTERVAL })
            .with(&CONTRACTS, &[MessageType::OpenInterest], Delivery::Poll { interval: OPEN_INTEREST_INTERVAL });
        Self { caps }
    }
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn exchange(&self) -> &str {
        "bybit"
    }

    fn capabilities(&self) -> &CapabilityDescriptor {
        &self.caps
    }

    fn stream_endpoint(&self, market_type: MarketType, _msg_type: MessageType) -> Option<StreamEndpoint> {
        let category = json_parser::category(market_type)?;
        let ping = PingPayload::Json(serde_json::json!({"op": "ping"}));
        Some(StreamEndpoint::new(format!("{WS_BASE}/{category}")).with_ping(PING_INTERVAL, ping))
    }

    fn candlestick_intervals(&self, _market_type: MarketType) -> &'static [u32] {
        json_parser::KLINE_SECONDS
    }

    fn build_subscription_request(&self, _market_type: MarketType, subscriptions: &[Subscription]) -> Vec<WireMessage> {
        let topics: Vec<String> = subscriptions.iter().filter_map(json_parser::topic).collect();
        topics.chunks(SUBSCRIBE_BATCH).map(|batch| WireMessage::Text(json_parser::build_subscribe(batch))).collect()
    }

    fn decode_frame(&self, _market_type: MarketType, frame: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
        json_parser::parse_message(frame)
    }

    fn poll_request(&self, market_type: MarketType, subscription: &Subscription) -> Option<PollRequest> {
        let category = json_parser::category(market_type)?;
        let symbol = subscription.symbol.as_deref()?;
        let url = match subscription.msg_type {
            MessageType::L2Snapshot => format!("{REST_BASE}/orderbook?category={category}&symbol={symbol}&limit=200"),
            MessageType::OpenInterest if market_type != MarketType::Spot => {
                format!("{REST_BASE}/open-interest?category={category}&symbol={symbol}&intervalTime=5min&limit=1")
            }
            _ => return None,
        };
        Some(PollRequest { url, msg_type: subscription.msg_type, symbol: Some(symbol.to_string()) })
    }

    fn decode_poll(&self, _market_type: MarketType, request: &PollRequest, body: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
        let payload = json_parser::rest_result(body)?;
        let symbol = request.symbol.clone().ok_or(DecodeError::MissingField("symbol"))?;
        Ok(vec![RawFrame { msg_type: request.msg_type, symbol, payload }])
    }

    fn symbols_request(&self, market_type: MarketType) -> Option<String> {
        let category = json_parser::category(market_type)?;
        Some(format!("{REST_BASE}/instruments-info?category={category}&limit=1000"))
    }

    fn parse_symbols(&self, market_type: MarketType, body: &[u8]) -> Result<Vec<String>, DecodeError> {
        json_parser::parse_instruments(market_type, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriptions_batched_by_ten() {
        let adapter = BybitAdapter::new();
        let subs: Vec<Subscription> =
            (0..23).map(|i| Subscription::new(format!("SYM{i}USDT"), MessageType::Trade)).collect();
        let msgs = adapter.build_subscription_request(MarketType::LinearSwap, &subs);
        assert_eq!(msgs.len(), 3);

        let sizes: Vec<usize> = msgs
            .iter()
            .map(|m| {
                let WireMessage::Text(text) = m else { panic!("expected text") };
                let v: serde_json::Value = serde_json::from_str(text).unwrap();
                assert_eq!(v["op"], "subscribe");
                v["args"].as_array().unwrap().len()
            })
            .collect();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[test]
    fn endpoint_per_category() {
        let adapter = BybitAdapter::new();
        let spot = adapter.stream_endpoint(MarketType::Spot, MessageType::Trade).unwrap();
        assert_eq!(spot.url, "wss://stream.bybit.com/v5/public/spot");
        let inverse = adapter.stream_endpoint(MarketType::InverseFuture, MessageType::Bbo).unwrap();
        assert_eq!(inverse.url, "wss://stream.bybit.com/v5/public/inverse");
        assert_eq!(spot.ping.unwrap().payload.to_wire(), WireMessage::Text(r#"{"op":"ping"}"#.into()));
    }

    #[test]
    fn open_interest_poll() {
        let adapter = BybitAdapter::new();
        let req = adapter
            .poll_request(MarketType::LinearSwap, &Subscription::new("BTCUSDT", MessageType::OpenInterest))
            .unwrap();
        assert!(req.url.contains("category=linear&symbol=BTCUSDT"));
        assert!(adapter.poll_request(MarketType::Spot, &Subscription::new("BTCUSDT", MessageType::OpenInterest)).is_none());

        let body = br#"{"retCode":0,"retMsg":"OK","result":{"symbol":"BTCUSDT","category":"linear","list":[{"openInterest":"461134384.00","timestamp":"1669571400000"}]}}"#;
        let raws = adapter.decode_poll(MarketType::LinearSwap, &req, body).unwrap();
        assert_eq!(raws[0].symbol, "BTCUSDT");
        assert_eq!(raws[0].payload["list"][0]["openInterest"], "461134384.00");
    }

    #[test]
    fn capabilities() {
        let caps = BybitAdapter::new();
        let caps = caps.capabilities();
        assert!(caps.supports(MarketType::InverseSwap, MessageType::Candlestick));
        assert!(!caps.supports(MarketType::Spot, MessageType::OpenInterest));
        assert!(!caps.supports_market(MarketType::Bvol));
    }
}
