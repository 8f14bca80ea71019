//! Adapter registry: maps an exchange identifier to its adapter.
//!
//! Populated once, then only read. Sessions share it through an `Arc`.

use std::sync::{Arc, LazyLock};

use ahash::AHashMap;
use crawl_core::MarketType;
use crawl_core::error::CrawlError;

use crate::adapter::ExchangeAdapter;

static GLOBAL: LazyLock<Arc<AdapterRegistry>> = LazyLock::new(|| Arc::new(AdapterRegistry::with_builtin()));

/// Exchange → adapter lookup table.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: AHashMap<String, Arc<dyn ExchangeAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry. Tests register synthetic adapters into one of these.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in exchange adapter.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::binance::BinanceAdapter::new()));
        registry.register(Arc::new(crate::okx::OkxAdapter::new()));
        registry.register(Arc::new(crate::bybit::BybitAdapter::new()));
        registry
    }

    /// Process-wide registry of the built-in adapters.
    pub fn global() -> Arc<AdapterRegistry> {
        GLOBAL.clone()
    }

    /// Register (or replace) the adapter for its exchange.
    pub fn register(&mut self, adapter: Arc<dyn ExchangeAdapter>) {
        self.adapters.insert(adapter.exchange().to_lowercase(), adapter);
    }

    /// Look up the adapter for `exchange` and check it declares `market_type`.
    pub fn resolve(&self, exchange: &str, market_type: MarketType) -> Result<Arc<dyn ExchangeAdapter>, CrawlError> {
        let adapter = self
            .adapters
            .get(&exchange.to_lowercase())
            .ok_or_else(|| CrawlError::not_supported(format!("unknown exchange '{exchange}'")))?;

        if !adapter.capabilities().supports_market(market_type) {
            return Err(CrawlError::not_supported(format!("{exchange} does not support market type {market_type}")));
        }
        Ok(adapter.clone())
    }

    /// Registered exchange identifiers, sorted.
    pub fn exchanges(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_exchanges() {
        let registry = AdapterRegistry::global();
        assert_eq!(registry.exchanges(), vec!["binance", "bybit", "okx"]);
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let registry = AdapterRegistry::with_builtin();
        let adapter = registry.resolve("Binance", MarketType::LinearSwap).unwrap();
        assert_eq!(adapter.exchange(), "binance");
    }

    #[test]
    fn unknown_exchange_not_supported() {
        let registry = AdapterRegistry::with_builtin();
        let err = registry.resolve("mtgox", MarketType::Spot).err().unwrap();
        assert!(matches!(err, CrawlError::NotSupported(_)));
    }

    #[test]
    fn undeclared_market_not_supported() {
        let registry = AdapterRegistry::with_builtin();
        let err = registry.resolve("bybit", MarketType::Bvol).err().unwrap();
        assert!(matches!(err, CrawlError::NotSupported(_)));
    }

    #[test]
    fn declared_markets_resolve() {
        let registry = AdapterRegistry::with_builtin();
        for name in registry.exchanges() {
            let adapter = registry.resolve(name, MarketType::Spot).unwrap();
            for market in adapter.capabilities().market_types() {
                assert!(registry.resolve(name, market).is_ok(), "{name} {market}");
            }
        }
    }
}
