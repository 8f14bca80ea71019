//! Configuration parsing for the crawler.
//!
//! The runner reads a single JSON file with logging metadata, engine tuning
//! knobs and a `jobs` array where each entry describes one crawl session.
//!
//! # Example config
//!
//! ```json
//! {
//!   "logging": { "module_name": "crawler", "log_path": "/tmp/log" },
//!   "crawler": { "buffer_capacity": 4096, "stop_grace_ms": 3000 },
//!   "jobs": [
//!     { "exchange": "binance", "market_type": "linear_swap",
//!       "msg_type": "trade", "symbols": ["BTCUSDT", "ETHUSDT"], "duration_sec": 60 },
//!     { "exchange": "okx", "market_type": "spot",
//!       "msg_type": "candlestick", "symbols": ["BTC-USDT"], "intervals": [60, 300] }
//!   ]
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::types::{MarketType, MessageType, Subscription};

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Logging metadata (module name, log path).
    #[serde(default)]
    pub logging: Option<LoggingConfig>,

    /// Engine tuning shared by every job.
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// One crawl session per entry.
    pub jobs: Vec<JobConfig>,
}

/// Logging metadata block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

// ---------------------------------------------------------------------------
// CrawlerConfig
// ---------------------------------------------------------------------------

const DEFAULT_BUFFER_CAPACITY: usize = 4096;
const DEFAULT_STOP_GRACE_MS: u64 = 3_000;
const DEFAULT_SYMBOL_REFRESH_SEC: u64 = 3_600;
const DEFAULT_DECODE_LOG_INTERVAL_MS: u64 = 10_000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Engine tuning knobs. Every field is optional; accessors apply defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrawlerConfig {
    /// Per-connection dispatch buffer, in messages (default: 4096).
    pub buffer_capacity: Option<usize>,

    /// How long `stop()` waits for connections and the consumer to drain
    /// (default: 3000 ms).
    pub stop_grace_ms: Option<u64>,

    /// Re-discovery period for "all symbols" subscriptions (default: hourly).
    pub symbol_refresh_sec: Option<u64>,

    /// Minimum spacing between decode-error log lines per connection
    /// (default: 10 s).
    pub decode_log_interval_ms: Option<u64>,

    /// Timeout for REST requests (default: 10 s).
    pub http_timeout_ms: Option<u64>,
}

impl CrawlerConfig {
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY).max(1)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms.unwrap_or(DEFAULT_STOP_GRACE_MS))
    }

    pub fn symbol_refresh(&self) -> Duration {
        Duration::from_secs(self.symbol_refresh_sec.unwrap_or(DEFAULT_SYMBOL_REFRESH_SEC).max(1))
    }

    pub fn decode_log_interval(&self) -> Duration {
        Duration::from_millis(self.decode_log_interval_ms.unwrap_or(DEFAULT_DECODE_LOG_INTERVAL_MS))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS))
    }
}

// ---------------------------------------------------------------------------
// JobConfig
// ---------------------------------------------------------------------------

/// One crawl job: an exchange, a market, a message type and its symbols.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Exchange identifier: `"binance"`, `"okx"`, `"bybit"`.
    pub exchange: String,

    pub market_type: MarketType,

    pub msg_type: MessageType,

    /// Symbols to crawl. Missing or empty means all symbols.
    pub symbols: Option<Vec<String>>,

    /// Candlestick intervals in seconds, applied to every symbol.
    pub intervals: Option<Vec<u32>>,

    /// Run time in seconds; missing or 0 runs until stopped.
    pub duration_sec: Option<u64>,
}

impl JobConfig {
    /// Expand into subscriptions: one per symbol (or one wildcard), times one
    /// per interval for candlesticks.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let base: Vec<Subscription> = match self.symbols.as_deref() {
            Some(symbols) if !symbols.is_empty() => {
                symbols.iter().map(|s| Subscription::new(s.clone(), self.msg_type)).collect()
            }
            _ => vec![Subscription::all(self.msg_type)],
        };

        match self.intervals.as_deref() {
            Some(intervals) if !intervals.is_empty() => base
                .iter()
                .flat_map(|sub| intervals.iter().map(move |i| sub.clone().with_interval(*i)))
                .collect(),
            _ => base,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_sec.unwrap_or(0))
    }

    /// Label used in logs, e.g. `binance_linear_swap_trade`.
    pub fn label(&self) -> String {
        format!("{}_{}_{}", self.exchange.to_lowercase(), self.market_type, self.msg_type)
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "logging": {"module_name": "crawler"},
            "crawler": {"buffer_capacity": 16, "stop_grace_ms": 500},
            "jobs": [
                {"exchange": "binance", "market_type": "linear_swap", "msg_type": "trade",
                 "symbols": ["BTCUSDT", "ETHUSDT"], "duration_sec": 5},
                {"exchange": "okx", "market_type": "spot", "msg_type": "candlestick",
                 "symbols": ["BTC-USDT"], "intervals": [60, 300]}
            ]
        }"#;
        let cfg: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.crawler.buffer_capacity(), 16);
        assert_eq!(cfg.crawler.stop_grace(), Duration::from_millis(500));
        assert_eq!(cfg.crawler.symbol_refresh(), Duration::from_secs(3600));
        assert_eq!(cfg.jobs.len(), 2);

        let trade = &cfg.jobs[0];
        assert_eq!(trade.market_type, MarketType::LinearSwap);
        assert_eq!(trade.duration(), Duration::from_secs(5));
        assert_eq!(trade.subscriptions().len(), 2);
        assert_eq!(trade.label(), "binance_linear_swap_trade");

        let candles = cfg.jobs[1].subscriptions();
        assert_eq!(candles.len(), 2);
        assert!(candles.iter().all(|s| s.msg_type == MessageType::Candlestick));
        assert_eq!(candles[1].interval, Some(300));
    }

    #[test]
    fn missing_symbols_means_all() {
        let json = r#"{"exchange": "bybit", "market_type": "spot", "msg_type": "ticker"}"#;
        let job: JobConfig = serde_json::from_str(json).unwrap();
        let subs = job.subscriptions();
        assert_eq!(subs, vec![Subscription::all(MessageType::Ticker)]);
        assert_eq!(job.duration(), Duration::ZERO);
    }

    #[test]
    fn defaults_without_crawler_block() {
        let cfg: AppConfig = serde_json::from_str(r#"{"jobs": []}"#).unwrap();
        assert_eq!(cfg.crawler.buffer_capacity(), DEFAULT_BUFFER_CAPACITY);
        assert!(cfg.logging.is_none());
    }
}
