//! The uniform message envelope and the subscription model.

use serde::{Deserialize, Serialize};

use super::enums::{MarketType, MessageType};
use crate::error::CrawlError;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One normalized market-data message, as handed to the consumer callback.
///
/// `json` is the exchange-specific payload re-serialized as a JSON string. It
/// is not schema-unified across exchanges; only `msg_type` tells the consumer
/// which kind of record it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Exchange identifier (`"binance"`, `"okx"`, ...). Never empty.
    pub exchange: String,
    pub market_type: MarketType,
    pub msg_type: MessageType,
    /// Exchange-native instrument identifier.
    pub symbol: String,
    /// Receipt time in milliseconds since Unix epoch. Non-decreasing within
    /// one connection.
    pub received_at: u64,
    pub json: String,
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A `(symbol, message type)` pair a crawl session should deliver.
///
/// `symbol == None` selects every listed symbol of the market. `interval` is
/// the candlestick width in seconds and is only valid on
/// [`MessageType::Candlestick`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub symbol: Option<String>,
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
}

impl Subscription {
    pub fn new(symbol: impl Into<String>, msg_type: MessageType) -> Self {
        Self { symbol: Some(symbol.into()), msg_type, interval: None }
    }

    /// Subscription covering all symbols of the market.
    pub fn all(msg_type: MessageType) -> Self {
        Self { symbol: None, msg_type, interval: None }
    }

    pub fn candlestick(symbol: impl Into<String>, interval: u32) -> Self {
        Self { symbol: Some(symbol.into()), msg_type: MessageType::Candlestick, interval: Some(interval) }
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Same subscription narrowed to one concrete symbol.
    pub fn for_symbol(&self, symbol: &str) -> Self {
        Self { symbol: Some(symbol.to_string()), msg_type: self.msg_type, interval: self.interval }
    }

    pub fn is_wildcard(&self) -> bool {
        self.symbol.is_none()
    }

    /// Shape checks that need no adapter knowledge.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if let Some(symbol) = &self.symbol {
            if symbol.trim().is_empty() {
                return Err(CrawlError::configuration("empty symbol in subscription"));
            }
        }
        match (self.msg_type, self.interval) {
            (MessageType::Candlestick, None) => {
                Err(CrawlError::configuration("candlestick subscription requires an interval"))
            }
            (MessageType::Candlestick, Some(0)) => {
                Err(CrawlError::configuration("candlestick interval must be positive"))
            }
            (other, Some(interval)) if other != MessageType::Candlestick => Err(CrawlError::configuration(
                format!("interval {interval}s given for non-candlestick message type {other}"),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_only_on_candlestick() {
        assert!(Subscription::candlestick("BTCUSDT", 60).validate().is_ok());
        let err = Subscription::new("BTCUSDT", MessageType::Trade).with_interval(60).validate().unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
        let err = Subscription::all(MessageType::Candlestick).validate().unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
    }

    #[test]
    fn empty_symbol_rejected() {
        let err = Subscription::new("  ", MessageType::Bbo).validate().unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
    }

    #[test]
    fn narrow_wildcard() {
        let all = Subscription::all(MessageType::Candlestick).with_interval(60);
        let one = all.for_symbol("ETHUSDT");
        assert!(all.is_wildcard());
        assert_eq!(one.symbol.as_deref(), Some("ETHUSDT"));
        assert_eq!(one.interval, Some(60));
    }
}
