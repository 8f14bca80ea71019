//! Turns adapter [`RawFrame`]s into [`Message`] envelopes.
//!
//! Each connection owns its own `Normalizer`; nothing here is shared across
//! connections.

use ahash::AHashMap;
use crawl_core::{MarketType, Message};

use crate::adapter::RawFrame;

/// Case-insensitive map from on-the-wire symbol spelling to the exchange's
/// canonical spelling (Binance stream names are lowercase, its symbols are
/// not).
#[derive(Debug, Clone, Default)]
pub struct SymbolCache {
    by_lower: AHashMap<String, String>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, canonical: &str) {
        self.by_lower.insert(canonical.to_lowercase(), canonical.to_string());
    }

    pub fn extend<'a>(&mut self, symbols: impl IntoIterator<Item = &'a str>) {
        for s in symbols {
            self.insert(s);
        }
    }

    /// Canonical spelling of `raw`, if known.
    pub fn canonical(&self, raw: &str) -> Option<&str> {
        if let Some(hit) = self.by_lower.get(raw) {
            return Some(hit.as_str());
        }
        self.by_lower.get(&raw.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_lower.is_empty()
    }
}

/// Stateless apart from the symbol cache.
#[derive(Debug, Clone)]
pub struct Normalizer {
    exchange: String,
    market_type: MarketType,
    symbols: SymbolCache,
}

impl Normalizer {
    pub fn new(exchange: &str, market_type: MarketType, symbols: SymbolCache) -> Self {
        Self { exchange: exchange.to_string(), market_type, symbols }
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolCache {
        &mut self.symbols
    }

    /// Wrap one raw record. Unknown symbols pass through unmodified.
    pub fn normalize(&self, raw: RawFrame, received_at: u64) -> Message {
        let symbol = match self.symbols.canonical(&raw.symbol) {
            Some(canonical) => canonical.to_string(),
            None => raw.symbol,
        };
        Message {
            exchange: self.exchange.clone(),
            market_type: self.market_type,
            msg_type: raw.msg_type,
            symbol,
            received_at,
            json: raw.payload.to_string(),
        }
    }

    /// Normalize every record of one frame, preserving their order.
    pub fn normalize_all(&self, raws: Vec<RawFrame>, received_at: u64) -> Vec<Message> {
        raws.into_iter().map(|raw| self.normalize(raw, received_at)).collect()
    }
}
