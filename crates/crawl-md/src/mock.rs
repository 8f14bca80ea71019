//! Scripted synthetic exchange for exercising sessions without a network.
//!
//! Frames are JSON of the form
//! `{"type":"trade","data":[{"symbol":"BTCUSDT","seq":1}, ...]}`; each element
//! of `data` becomes one record. `{"event":...}` frames are control frames.
//! Every connection replays the same script, then either idles or, in
//! continuous mode, emits an endless trade stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crawl_core::backoff::BackoffSpec;
use crawl_core::error::{ConnectionError, DecodeError};
use crawl_core::transport::{Transport, WireMessage};
use crawl_core::{MarketType, MessageType, Subscription};
use serde_json::{Value, json};

use crate::adapter::{
    CapabilityDescriptor, Delivery, ExchangeAdapter, PollRequest, RawFrame, StreamEndpoint,
};

const STREAMED: [MessageType; 6] = [
    MessageType::Trade,
    MessageType::L2Event,
    MessageType::Bbo,
    MessageType::Ticker,
    MessageType::Candlestick,
    MessageType::FundingRate,
];
const POLLED: [MessageType; 2] = [MessageType::L2Snapshot, MessageType::OpenInterest];

/// What the mock observed, shared with the test that built it.
#[derive(Debug, Default)]
pub struct MockLog {
    connects: Mutex<Vec<Instant>>,
    sent: Mutex<Vec<String>>,
    frames_served: AtomicU64,
    fetches: AtomicU64,
}

impl MockLog {
    /// Times of every connect attempt, including refused ones.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().map(|v| v.len()).unwrap_or_default()
    }

    /// Text of every message sent over any mock transport.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Frames handed to connection managers, across all connections.
    pub fn frames_served(&self) -> u64 {
        self.frames_served.load(Ordering::Relaxed)
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

pub struct MockAdapter {
    name: String,
    caps: CapabilityDescriptor,
    script: Vec<Vec<u8>>,
    continuous: bool,
    closing: bool,
    pace: Duration,
    refuse_connects: AtomicUsize,
    backoff: BackoffSpec,
    poll_body: Option<Vec<u8>>,
    bulk_poll: bool,
    symbols: Vec<String>,
    intervals: &'static [u32],
    wildcard: bool,
    max_per_conn: usize,
    log: Arc<MockLog>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Spot and linear-swap markets; trade, order-book events, BBO, ticker,
    /// funding rate and candlesticks streamed; snapshots and open interest
    /// polled every 50 ms.
    pub fn new() -> Self {
        let markets = [MarketType::Spot, MarketType::LinearSwap];
        let caps = CapabilityDescriptor::new()
            .with(&markets, &STREAMED, Delivery::Stream)
            .with(&markets, &POLLED, Delivery::Poll { interval: Duration::from_millis(50) });

        Self {
            name: "mock".into(),
            caps,
            script: Vec::new(),
            continuous: false,
            closing: false,
            pace: Duration::from_millis(1),
            refuse_connects: AtomicUsize::new(0),
            backoff: BackoffSpec::new(Duration::from_millis(10), Duration::from_millis(100)),
            poll_body: None,
            bulk_poll: false,
            symbols: Vec::new(),
            intervals: &[],
            wildcard: false,
            max_per_conn: 100,
            log: Arc::new(MockLog::default()),
        }
    }

    /// Frames replayed on every connection.
    pub fn with_script(mut self, frames: Vec<Vec<u8>>) -> Self {
        self.script = frames;
        self
    }

    /// After the script, stream trades forever, one per `pace`.
    pub fn continuous(mut self, pace: Duration) -> Self {
        self.continuous = true;
        self.pace = pace;
        self
    }

    /// End the stream once the script is exhausted.
    pub fn closing(mut self) -> Self {
        self.closing = true;
        self
    }

    /// Refuse the next `n` connects (`usize::MAX` refuses forever).
    pub fn refuse_connects(self, n: usize) -> Self {
        self.refuse_connects.store(n, Ordering::Relaxed);
        self
    }

    pub fn with_backoff(mut self, spec: BackoffSpec) -> Self {
        self.backoff = spec;
        self
    }

    /// Body returned by every REST fetch. Without one, fetches fail.
    pub fn with_poll_body(mut self, body: Value) -> Self {
        self.poll_body = Some(body.to_string().into_bytes());
        self
    }

    /// Serve wildcard polls with one bulk request.
    pub fn with_bulk_poll(mut self) -> Self {
        self.bulk_poll = true;
        self
    }

    pub fn with_symbols(mut self, symbols: &[&str]) -> Self {
        self.symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_intervals(mut self, intervals: &'static [u32]) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn with_wildcard(mut self) -> Self {
        self.wildcard = true;
        self
    }

    pub fn with_max_per_connection(mut self, n: usize) -> Self {
        self.max_per_conn = n;
        self
    }

    pub fn log(&self) -> Arc<MockLog> {
        self.log.clone()
    }

    pub fn frame(msg_type: MessageType, records: &[(&str, u64)]) -> Vec<u8> {
        let data: Vec<Value> = records.iter().map(|(s, seq)| json!({"symbol": s, "seq": seq})).collect();
        json!({"type": msg_type.as_str(), "data": data}).to_string().into_bytes()
    }

    pub fn trade_frame(symbol: &str, seq: u64) -> Vec<u8> {
        Self::frame(MessageType::Trade, &[(symbol, seq)])
    }
}

#[async_trait]
impl ExchangeAdapter for MockAdapter {
    fn exchange(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &CapabilityDescriptor {
        &self.caps
    }

    fn stream_endpoint(&self, market_type: MarketType, _msg_type: MessageType) -> Option<StreamEndpoint> {
        Some(StreamEndpoint::new(format!("mock://{market_type}")))
    }

    fn max_subscriptions_per_connection(&self) -> usize {
        self.max_per_conn
    }

    fn supports_wildcard(&self, _market_type: MarketType, _msg_type: MessageType) -> bool {
        self.wildcard
    }

    fn candlestick_intervals(&self, _market_type: MarketType) -> &'static [u32] {
        self.intervals
    }

    async fn connect(&self, _endpoint: &StreamEndpoint) -> Result<Box<dyn Transport>, ConnectionError> {
        if let Ok(mut connects) = self.log.connects.lock() {
            connects.push(Instant::now());
        }
        let refused = self
            .refuse_connects
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if refused {
            return Err(ConnectionError::Connect("mock: connection refused".into()));
        }

        Ok(Box::new(MockTransport {
            script: self.script.iter().cloned().collect(),
            continuous: self.continuous,
            closing: self.closing,
            pace: self.pace,
            seq: 0,
            log: self.log.clone(),
        }))
    }

    fn build_subscription_request(&self, _market_type: MarketType, subscriptions: &[Subscription]) -> Vec<WireMessage> {
        let args: Vec<String> = subscriptions
            .iter()
            .map(|s| format!("{}:{}", s.msg_type, s.symbol.as_deref().unwrap_or("*")))
            .collect();
        vec![WireMessage::Text(json!({"op": "subscribe", "args": args}).to_string())]
    }

    fn decode_frame(&self, _market_type: MarketType, frame: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
        let v: Value = serde_json::from_slice(frame)?;
        if v.get("event").is_some() {
            return Ok(Vec::new());
        }
        let kind = v.get("type").and_then(Value::as_str).ok_or(DecodeError::MissingField("type"))?;
        let msg_type: MessageType = kind.parse().map_err(|_| DecodeError::UnknownChannel(kind.to_string()))?;
        let data = v.get("data").and_then(Value::as_array).ok_or(DecodeError::MissingField("data"))?;

        data.iter()
            .map(|item| {
                let symbol = item.get("symbol").and_then(Value::as_str).ok_or(DecodeError::MissingField("symbol"))?;
                Ok(RawFrame { msg_type, symbol: symbol.to_string(), payload: item.clone() })
            })
            .collect()
    }

    fn reconnect_policy(&self) -> BackoffSpec {
        self.backoff
    }

    fn poll_request(&self, market_type: MarketType, subscription: &Subscription) -> Option<PollRequest> {
        match &subscription.symbol {
            Some(symbol) => Some(PollRequest {
                url: format!("mock://{market_type}/{}/{symbol}", subscription.msg_type),
                msg_type: subscription.msg_type,
                symbol: Some(symbol.clone()),
            }),
            None if self.bulk_poll => Some(PollRequest {
                url: format!("mock://{market_type}/{}", subscription.msg_type),
                msg_type: subscription.msg_type,
                symbol: None,
            }),
            None => None,
        }
    }

    async fn fetch(&self, _request: &PollRequest, _timeout: Duration) -> Result<Vec<u8>, ConnectionError> {
        self.log.fetches.fetch_add(1, Ordering::Relaxed);
        self.poll_body.clone().ok_or_else(|| ConnectionError::Http("mock: 503".into()))
    }

    fn decode_poll(&self, _market_type: MarketType, request: &PollRequest, body: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
        let payload: Value = serde_json::from_slice(body)?;
        match &request.symbol {
            Some(symbol) => Ok(vec![RawFrame { msg_type: request.msg_type, symbol: symbol.clone(), payload }]),
            None => self
                .symbols
                .iter()
                .map(|s| Ok(RawFrame { msg_type: request.msg_type, symbol: s.clone(), payload: payload.clone() }))
                .collect(),
        }
    }

    fn symbols_request(&self, _market_type: MarketType) -> Option<String> {
        Some("mock://symbols".into())
    }

    fn parse_symbols(&self, _market_type: MarketType, body: &[u8]) -> Result<Vec<String>, DecodeError> {
        Ok(serde_json::from_slice(body)?)
    }

    async fn fetch_symbols(&self, _market_type: MarketType, _timeout: Duration) -> Result<Vec<String>, ConnectionError> {
        self.log.fetches.fetch_add(1, Ordering::Relaxed);
        if self.symbols.is_empty() {
            return Err(ConnectionError::Http("mock: no symbols".into()));
        }
        Ok(self.symbols.clone())
    }
}

struct MockTransport {
    script: VecDeque<Vec<u8>>,
    continuous: bool,
    closing: bool,
    pace: Duration,
    seq: u64,
    log: Arc<MockLog>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, msg: WireMessage) -> Result<(), ConnectionError> {
        if let (WireMessage::Text(text), Ok(mut sent)) = (msg, self.log.sent.lock()) {
            sent.push(text);
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, ConnectionError>> {
        if let Some(frame) = self.script.pop_front() {
            self.log.frames_served.fetch_add(1, Ordering::Relaxed);
            return Some(Ok(frame));
        }
        if self.closing {
            return None;
        }
        if !self.continuous {
            return std::future::pending().await;
        }
        tokio::time::sleep(self.pace).await;
        self.seq += 1;
        self.log.frames_served.fetch_add(1, Ordering::Relaxed);
        Some(Ok(MockAdapter::trade_frame("BTCUSDT", self.seq)))
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bundles_in_order() {
        let mock = MockAdapter::new();
        let frame = MockAdapter::frame(MessageType::Trade, &[("A", 1), ("A", 2), ("B", 3)]);
        let raws = mock.decode_frame(MarketType::Spot, &frame).unwrap();
        let seqs: Vec<u64> = raws.iter().map(|r| r.payload["seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(raws[2].symbol, "B");
    }

    #[test]
    fn control_and_malformed_frames() {
        let mock = MockAdapter::new();
        assert!(mock.decode_frame(MarketType::Spot, br#"{"event":"subscribed"}"#).unwrap().is_empty());
        assert!(matches!(mock.decode_frame(MarketType::Spot, b"{oops"), Err(DecodeError::Json(_))));
        assert!(matches!(
            mock.decode_frame(MarketType::Spot, br#"{"type":"nope","data":[]}"#),
            Err(DecodeError::UnknownChannel(_))
        ));
    }

    #[tokio::test]
    async fn refuses_then_accepts() {
        let mock = MockAdapter::new().refuse_connects(2);
        let endpoint = StreamEndpoint::new("mock://spot");
        assert!(mock.connect(&endpoint).await.is_err());
        assert!(mock.connect(&endpoint).await.is_err());
        assert!(mock.connect(&endpoint).await.is_ok());
        assert_eq!(mock.log().connect_count(), 3);
    }
}
