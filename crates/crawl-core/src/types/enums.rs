//! Enumerations shared by every exchange adapter.
//!
//! The serialized names double as the identifiers used in config files and in
//! connection labels (`binance_linear_swap_0`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market types
// ---------------------------------------------------------------------------

/// Instrument category. Disambiguates symbol semantics within an exchange
/// (`BTCUSDT` on Binance spot and on Binance USDⓈ-M swap are different
/// instruments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Spot,
    LinearFuture,
    InverseFuture,
    LinearSwap,
    InverseSwap,
    AmericanOption,
    EuropeanOption,
    QuantoFuture,
    QuantoSwap,
    Move,
    Bvol,
}

impl MarketType {
    pub const ALL: [MarketType; 11] = [
        Self::Spot,
        Self::LinearFuture,
        Self::InverseFuture,
        Self::LinearSwap,
        Self::InverseSwap,
        Self::AmericanOption,
        Self::EuropeanOption,
        Self::QuantoFuture,
        Self::QuantoSwap,
        Self::Move,
        Self::Bvol,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::LinearFuture => "linear_future",
            Self::InverseFuture => "inverse_future",
            Self::LinearSwap => "linear_swap",
            Self::InverseSwap => "inverse_swap",
            Self::AmericanOption => "american_option",
            Self::EuropeanOption => "european_option",
            Self::QuantoFuture => "quanto_future",
            Self::QuantoSwap => "quanto_swap",
            Self::Move => "move",
            Self::Bvol => "bvol",
        }
    }

    /// Perpetual swaps, the only markets with funding rates.
    pub fn is_swap(&self) -> bool {
        matches!(self, Self::LinearSwap | Self::InverseSwap | Self::QuantoSwap)
    }

    /// Any derivative market (open interest is meaningful).
    pub fn is_derivative(&self) -> bool {
        !matches!(self, Self::Spot)
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown market type: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// The data category a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "trade")]
    Trade,
    /// Incremental level-2 order book updates.
    #[serde(rename = "l2_event")]
    L2Event,
    /// Incremental level-3 (per order) updates.
    #[serde(rename = "l3_event")]
    L3Event,
    /// Full level-2 book, fetched over REST.
    #[serde(rename = "l2_snapshot")]
    L2Snapshot,
    /// Top-k level-2 snapshot pushed over the stream.
    #[serde(rename = "l2_topk")]
    L2TopK,
    /// Full level-3 book, fetched over REST.
    #[serde(rename = "l3_snapshot")]
    L3Snapshot,
    /// Best bid and offer.
    #[serde(rename = "bbo")]
    Bbo,
    /// 24h rolling window ticker.
    #[serde(rename = "ticker")]
    Ticker,
    #[serde(rename = "funding_rate")]
    FundingRate,
    #[serde(rename = "candlestick")]
    Candlestick,
    #[serde(rename = "open_interest")]
    OpenInterest,
}

impl MessageType {
    pub const ALL: [MessageType; 11] = [
        Self::Trade,
        Self::L2Event,
        Self::L3Event,
        Self::L2Snapshot,
        Self::L2TopK,
        Self::L3Snapshot,
        Self::Bbo,
        Self::Ticker,
        Self::FundingRate,
        Self::Candlestick,
        Self::OpenInterest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::L2Event => "l2_event",
            Self::L3Event => "l3_event",
            Self::L2Snapshot => "l2_snapshot",
            Self::L2TopK => "l2_topk",
            Self::L3Snapshot => "l3_snapshot",
            Self::Bbo => "bbo",
            Self::Ticker => "ticker",
            Self::FundingRate => "funding_rate",
            Self::Candlestick => "candlestick",
            Self::OpenInterest => "open_interest",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown message type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_names_match_display() {
        for mt in MarketType::ALL {
            let json = serde_json::to_string(&mt).unwrap();
            assert_eq!(json, format!("\"{mt}\""));
        }
        for msg in MessageType::ALL {
            let json = serde_json::to_string(&msg).unwrap();
            assert_eq!(json, format!("\"{msg}\""));
        }
    }

    #[test]
    fn parse_from_str() {
        assert_eq!("linear_swap".parse::<MarketType>().unwrap(), MarketType::LinearSwap);
        assert_eq!("L2_TOPK".parse::<MessageType>().unwrap(), MessageType::L2TopK);
        assert!("perp".parse::<MarketType>().is_err());
    }

    #[test]
    fn market_classification() {
        assert!(MarketType::InverseSwap.is_swap());
        assert!(!MarketType::LinearFuture.is_swap());
        assert!(MarketType::LinearFuture.is_derivative());
        assert!(!MarketType::Spot.is_derivative());
    }
}
