//! Binance adapter.
//!
//! Three combined-stream hosts:
//! - Spot (`stream.binance.com`)
//! - USDⓈ-margined futures and swaps (`fstream.binance.com`)
//! - Coin-margined futures and swaps (`dstream.binance.com`)
//!
//! Binance sends protocol pings itself; the transport answers them, so no
//! client keep-alive is configured. Order-book snapshots and open interest
//! come from the REST API of the same market.

pub mod json_parser;

use std::time::Duration;

use async_trait::async_trait;
use crawl_core::error::DecodeError;
use crawl_core::transport::WireMessage;
use crawl_core::{MarketType, MessageType, Subscription};

use crate::adapter::{CapabilityDescriptor, Delivery, ExchangeAdapter, PollRequest, RawFrame, StreamEndpoint};

const SPOT_WS_URL: &str = "wss://stream.binance.com:9443/stream";
const USDM_WS_URL: &str = "wss://fstream.binance.com/stream";
const COINM_WS_URL: &str = "wss://dstream.binance.com/stream";

const SPOT_REST: &str = "https://api.binance.com/api/v3";
const USDM_REST: &str = "https://fapi.binance.com/fapi/v1";
const COINM_REST: &str = "https://dapi.binance.com/dapi/v1";

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);
const OPEN_INTEREST_INTERVAL: Duration = Duration::from_secs(60);

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

pub struct BinanceAdapter {
    caps: CapabilityDescriptor,
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceAdapter {
    pub fn new() -> Self {
        let caps = CapabilityDescriptor::new()
            .with(&[MarketType::Spot], &STREAMED, Delivery::Stream)
            .with(&CONTRACTS, &STREAMED, Delivery::Stream)
            .with(&SWAPS, &[MessageType::FundingRate], Delivery::Stream)
            .with(&[MarketType::Spot], &[MessageType::L2Snapshot], Delivery::Poll { interval: SNAPSHOT_INTERVAL })
            .with(&CONTRACTS, &[MessageType::L2Snapshot], Delivery::Poll { interval: SNAPSHOT_INTERVAL })
            .with(&CONTRACTS, &[MessageType::OpenInterest], Delivery::Poll { interval: OPEN_INTEREST_INTERVAL });
        Self { caps }
    }

    fn ws_url(market_type: MarketType) -> Option<&'static str> {
        match market_type {
            MarketType::Spot => Some(SPOT_WS_URL),
            MarketType::LinearSwap | MarketType::LinearFuture => Some(USDM_WS_URL),
            MarketType::InverseSwap | MarketType::InverseFuture => Some(COINM_WS_URL),
            _ => None,
        }
    }

    fn rest_base(market_type: MarketType) -> Option<&'static str> {
        match market_type {
            MarketType::Spot => Some(SPOT_REST),
            MarketType::LinearSwap | MarketType::LinearFuture => Some(USDM_REST),
            MarketType::InverseSwap | MarketType::InverseFuture => Some(COINM_REST),
            _ => None,
        }
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn exchange(&self) -> &str {
        "binance"
    }

    fn capabilities(&self) -> &CapabilityDescriptor {
        &self.caps
    }

    fn stream_endpoint(&self, market_type: MarketType, _msg_type: MessageType) -> Option<StreamEndpoint> {
        Self::ws_url(market_type).map(StreamEndpoint::new)
    }

    fn max_subscriptions_per_connection(&self) -> usize {
        200
    }

    fn supports_wildcard(&self, market_type: MarketType, msg_type: MessageType) -> bool {
        json_parser::wildcard_topic(market_type, msg_type).is_some()
    }

    fn candlestick_intervals(&self, market_type: MarketType) -> &'static [u32] {
        match market_type {
            MarketType::Spot => json_parser::SPOT_KLINE_SECONDS,
            _ => json_parser::FUTURES_KLINE_SECONDS,
        }
    }

    fn build_subscription_request(&self, market_type: MarketType, subscriptions: &[Subscription]) -> Vec<WireMessage> {
        let params: Vec<String> = subscriptions.iter().filter_map(|s| json_parser::topic(market_type, s)).collect();
        if params.is_empty() {
            return Vec::new();
        }
        vec![WireMessage::Text(json_parser::build_subscribe(&params, 1))]
    }

    fn decode_frame(&self, _market_type: MarketType, frame: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
        json_parser::parse_message(frame)
    }

    fn poll_request(&self, market_type: MarketType, subscription: &Subscription) -> Option<PollRequest> {
        let base = Self::rest_base(market_type)?;
        let symbol = subscription.symbol.as_deref()?;
        let url = match subscription.msg_type {
            MessageType::L2Snapshot => format!("{base}/depth?symbol={symbol}&limit=1000"),
            MessageType::OpenInterest if market_type != MarketType::Spot => {
                format!("{base}/openInterest?symbol={symbol}")
            }
            _ => return None,
        };
        Some(PollRequest { url, msg_type: subscription.msg_type, symbol: Some(symbol.to_string()) })
    }

    fn symbols_request(&self, market_type: MarketType) -> Option<String> {
        Self::rest_base(market_type).map(|base| format!("{base}/exchangeInfo"))
    }

    fn parse_symbols(&self, market_type: MarketType, body: &[u8]) -> Result<Vec<String>, DecodeError> {
        json_parser::parse_exchange_info(market_type, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities() {
        let adapter = BinanceAdapter::new();
        let caps = adapter.capabilities();
        assert_eq!(caps.delivery(MarketType::Spot, MessageType::Trade), Some(Delivery::Stream));
        assert!(caps.supports(MarketType::LinearSwap, MessageType::FundingRate));
        assert!(!caps.supports(MarketType::Spot, MessageType::FundingRate));
        assert!(!caps.supports(MarketType::Spot, MessageType::OpenInterest));
        assert!(matches!(caps.delivery(MarketType::InverseFuture, MessageType::OpenInterest), Some(Delivery::Poll { .. })));
        assert!(!caps.supports_market(MarketType::EuropeanOption));
    }

    #[test]
    fn endpoints_per_market() {
        let adapter = BinanceAdapter::new();
        let url = |m| adapter.stream_endpoint(m, MessageType::Trade).unwrap().url;
        assert_eq!(url(MarketType::Spot), SPOT_WS_URL);
        assert_eq!(url(MarketType::LinearFuture), USDM_WS_URL);
        assert_eq!(url(MarketType::InverseSwap), COINM_WS_URL);
    }

    #[test]
    fn one_subscribe_message_per_connection() {
        let adapter = BinanceAdapter::new();
        let subs = vec![
            Subscription::new("BTCUSDT", MessageType::Trade),
            Subscription::new("ETHUSDT", MessageType::Trade),
            Subscription::candlestick("BTCUSDT", 60),
        ];
        let msgs = adapter.build_subscription_request(MarketType::LinearSwap, &subs);
        assert_eq!(msgs.len(), 1);
        let WireMessage::Text(text) = &msgs[0] else { panic!("expected text") };
        let v: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(v["method"], "SUBSCRIBE");
        assert_eq!(v["params"], serde_json::json!(["btcusdt@aggTrade", "ethusdt@aggTrade", "btcusdt@kline_1m"]));
    }

    #[test]
    fn rest_requests() {
        let adapter = BinanceAdapter::new();
        let snap = adapter
            .poll_request(MarketType::InverseSwap, &Subscription::new("BTCUSD_PERP", MessageType::L2Snapshot))
            .unwrap();
        assert_eq!(snap.url, "https://dapi.binance.com/dapi/v1/depth?symbol=BTCUSD_PERP&limit=1000");
        assert_eq!(snap.symbol.as_deref(), Some("BTCUSD_PERP"));
        assert!(adapter.poll_request(MarketType::LinearSwap, &Subscription::all(MessageType::OpenInterest)).is_none());
        assert_eq!(
            adapter.symbols_request(MarketType::Spot).as_deref(),
            Some("https://api.binance.com/api/v3/exchangeInfo")
        );
    }

    #[test]
    fn decode_poll_tags_requested_symbol() {
        let adapter = BinanceAdapter::new();
        let req = adapter
            .poll_request(MarketType::LinearSwap, &Subscription::new("BTCUSDT", MessageType::OpenInterest))
            .unwrap();
        let raws = adapter
            .decode_poll(MarketType::LinearSwap, &req, br#"{"openInterest":"10659.509","symbol":"BTCUSDT","time":1589437530011}"#)
            .unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].msg_type, MessageType::OpenInterest);
        assert_eq!(raws[0].symbol, "BTCUSDT");
    }
}
