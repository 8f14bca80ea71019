//! Exchange adapter capability interface.
//!
//! An [`ExchangeAdapter`] knows one exchange's wire protocol: where to
//! connect, how to phrase subscriptions, how to split a received frame into
//! [`RawFrame`]s, how to poll REST endpoints and how patiently to reconnect.
//! It holds no connection state; the connection managers own transports and
//! call into the adapter.

use std::collections::HashMap;
use std::time::Duration;

use ahash::AHashMap;
use async_trait::async_trait;
use crawl_core::backoff::BackoffSpec;
use crawl_core::error::{ConnectionError, DecodeError};
use crawl_core::transport::{Transport, WireMessage};
use crawl_core::ws::{PingPayload, WsTransport};
use crawl_core::{MarketType, MessageType, Subscription, http};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Capability descriptor
// ---------------------------------------------------------------------------

/// How a message type reaches the crawler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Pushed over a persistent streaming connection.
    Stream,
    /// Fetched over REST every `interval`.
    Poll { interval: Duration },
}

/// Per-exchange declaration of supported `(market type, message type)` pairs
/// and their delivery mode. Built once when the adapter is constructed.
#[derive(Debug, Clone, Default)]
pub struct CapabilityDescriptor {
    entries: AHashMap<(MarketType, MessageType), Delivery>,
}

impl CapabilityDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare every combination of `markets` × `msg_types` with `delivery`.
    pub fn with(mut self, markets: &[MarketType], msg_types: &[MessageType], delivery: Delivery) -> Self {
        for &market in markets {
            for &msg_type in msg_types {
                self.entries.insert((market, msg_type), delivery);
            }
        }
        self
    }

    pub fn delivery(&self, market_type: MarketType, msg_type: MessageType) -> Option<Delivery> {
        self.entries.get(&(market_type, msg_type)).copied()
    }

    pub fn supports_market(&self, market_type: MarketType) -> bool {
        self.entries.keys().any(|(m, _)| *m == market_type)
    }

    pub fn supports(&self, market_type: MarketType, msg_type: MessageType) -> bool {
        self.entries.contains_key(&(market_type, msg_type))
    }

    /// Supported market types, sorted.
    pub fn market_types(&self) -> Vec<MarketType> {
        let mut markets: Vec<MarketType> = self.entries.keys().map(|(m, _)| *m).collect();
        markets.sort();
        markets.dedup();
        markets
    }
}

// ---------------------------------------------------------------------------
// Adapter I/O types
// ---------------------------------------------------------------------------

/// Ping / keep-alive configuration for a streaming connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PingConfig {
    pub interval: Duration,
    pub payload: PingPayload,
}

/// Where and how to open a streaming connection.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEndpoint {
    pub url: String,
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Client-initiated keep-alive, if the exchange requires one.
    pub ping: Option<PingConfig>,
    /// Bound on TCP connect, TLS and the upgrade handshake.
    pub connect_timeout: Duration,
}

impl StreamEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), extra_headers: HashMap::new(), ping: None, connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }

    pub fn with_ping(mut self, interval: Duration, payload: PingPayload) -> Self {
        self.ping = Some(PingConfig { interval, payload });
        self
    }
}

/// One REST request issued by a poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub url: String,
    pub msg_type: MessageType,
    /// Symbol the response belongs to; `None` for bulk endpoints whose
    /// response names the symbol of each record.
    pub symbol: Option<String>,
}

/// One decoded record, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub msg_type: MessageType,
    /// Symbol as it appears on the wire (may differ in case from the
    /// exchange's canonical spelling).
    pub symbol: String,
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// ExchangeAdapter
// ---------------------------------------------------------------------------

/// Trait implemented by every exchange-specific protocol plugin.
///
/// Adapters are shared read-only across sessions, so they must be `Sync`.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Exchange identifier, lowercase (`"binance"`).
    fn exchange(&self) -> &str;

    /// What this adapter can deliver, and how.
    fn capabilities(&self) -> &CapabilityDescriptor;

    /// Endpoint serving `msg_type` on `market_type`. Subscriptions resolving
    /// to the same URL may share a connection.
    fn stream_endpoint(&self, market_type: MarketType, msg_type: MessageType) -> Option<StreamEndpoint>;

    /// Upper bound of subscriptions multiplexed on one connection.
    fn max_subscriptions_per_connection(&self) -> usize {
        100
    }

    /// Whether a wildcard (all symbols) subscription is served natively by a
    /// single topic. If not, the session discovers symbols over REST.
    fn supports_wildcard(&self, _market_type: MarketType, _msg_type: MessageType) -> bool {
        false
    }

    /// Candlestick widths (seconds) the exchange streams for `market_type`.
    fn candlestick_intervals(&self, _market_type: MarketType) -> &'static [u32] {
        &[]
    }

    /// Open a streaming connection.
    async fn connect(&self, endpoint: &StreamEndpoint) -> Result<Box<dyn Transport>, ConnectionError> {
        let transport = WsTransport::connect(&endpoint.url, &endpoint.extra_headers, endpoint.connect_timeout).await?;
        Ok(Box::new(transport))
    }

    /// Wire messages subscribing to `subscriptions`, sent in order right after
    /// connecting.
    fn build_subscription_request(
        &self,
        market_type: MarketType,
        subscriptions: &[Subscription],
    ) -> Vec<WireMessage>;

    /// Split one received frame into records, in the frame's internal order.
    ///
    /// Control frames (acks, pongs) decode to an empty vec. Malformed frames
    /// are errors; the caller counts and skips them.
    fn decode_frame(&self, market_type: MarketType, frame: &[u8]) -> Result<Vec<RawFrame>, DecodeError>;

    /// Backoff applied between reconnect attempts and failed fetches.
    fn reconnect_policy(&self) -> BackoffSpec {
        BackoffSpec::default()
    }

    /// REST request for a poll-delivered subscription. A wildcard
    /// subscription yields a bulk request, or `None` when the exchange has no
    /// bulk endpoint and the poller must iterate listed symbols.
    fn poll_request(&self, market_type: MarketType, subscription: &Subscription) -> Option<PollRequest>;

    /// Run a REST request.
    async fn fetch(&self, request: &PollRequest, timeout: Duration) -> Result<Vec<u8>, ConnectionError> {
        http::get_bytes(&request.url, timeout).await
    }

    /// Decode a REST response into records.
    ///
    /// The default treats the whole body as one record for the requested
    /// symbol.
    fn decode_poll(
        &self,
        _market_type: MarketType,
        request: &PollRequest,
        body: &[u8],
    ) -> Result<Vec<RawFrame>, DecodeError> {
        let payload: serde_json::Value = serde_json::from_slice(body)?;
        let symbol = request.symbol.clone().ok_or(DecodeError::MissingField("symbol"))?;
        Ok(vec![RawFrame { msg_type: request.msg_type, symbol, payload }])
    }

    /// REST request listing the tradable symbols of `market_type`.
    fn symbols_request(&self, market_type: MarketType) -> Option<String>;

    /// Extract symbols from the listing response.
    fn parse_symbols(&self, market_type: MarketType, body: &[u8]) -> Result<Vec<String>, DecodeError>;

    /// Currently listed symbols of `market_type`.
    async fn fetch_symbols(&self, market_type: MarketType, timeout: Duration) -> Result<Vec<String>, ConnectionError> {
        let url = self
            .symbols_request(market_type)
            .ok_or_else(|| ConnectionError::Http(format!("{} has no symbol listing for {market_type}", self.exchange())))?;
        let body = http::get_bytes(&url, timeout).await?;
        self.parse_symbols(market_type, &body).map_err(|e| ConnectionError::Http(format!("symbol listing: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_lookup() {
        let caps = CapabilityDescriptor::new()
            .with(&[MarketType::Spot, MarketType::LinearSwap], &[MessageType::Trade], Delivery::Stream)
            .with(
                &[MarketType::LinearSwap],
                &[MessageType::OpenInterest],
                Delivery::Poll { interval: Duration::from_secs(60) },
            );

        assert_eq!(caps.delivery(MarketType::Spot, MessageType::Trade), Some(Delivery::Stream));
        assert_eq!(
            caps.delivery(MarketType::LinearSwap, MessageType::OpenInterest),
            Some(Delivery::Poll { interval: Duration::from_secs(60) })
        );
        assert!(!caps.supports(MarketType::Spot, MessageType::OpenInterest));
        assert!(caps.supports_market(MarketType::LinearSwap));
        assert!(!caps.supports_market(MarketType::InverseSwap));
        assert_eq!(caps.market_types(), vec![MarketType::Spot, MarketType::LinearSwap]);
    }
}
