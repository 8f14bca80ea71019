//! Connection managers.
//!
//! One tokio task per live transport:
//!
//! - [`stream::StreamManager`]: persistent streaming connection with
//!   reconnect/backoff (`Disconnected → Connecting → Subscribing → Streaming`).
//! - [`poll::Poller`]: periodic REST fetch (`Idle → Fetching → Idle`).
//! - [`discovery::SymbolDiscovery`]: resolves "all symbols" subscriptions
//!   and spawns stream managers for newly listed symbols.
//!
//! Every manager observes the session's cancellation token at each await
//! point and exits without leaking its transport.

pub mod discovery;
pub mod poll;
pub mod stream;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crawl_core::MarketType;
use crawl_core::config::CrawlerConfig;
use crawl_core::error::DecodeError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::adapter::ExchangeAdapter;
use crate::dispatch::DispatchHandle;
use crate::stats::Counters;

/// Everything a manager shares with its session.
#[derive(Clone)]
pub struct ConnContext {
    pub adapter: Arc<dyn ExchangeAdapter>,
    pub market_type: MarketType,
    pub config: Arc<CrawlerConfig>,
    pub counters: Arc<Counters>,
    pub dispatch: DispatchHandle,
    pub cancel: CancellationToken,
}

impl ConnContext {
    pub fn exchange(&self) -> &str {
        self.adapter.exchange()
    }

    /// Log label prefix, e.g. `binance_spot`.
    pub fn label(&self, suffix: impl fmt::Display) -> String {
        format!("{}_{}_{}", self.exchange(), self.market_type, suffix)
    }

    /// Sleep for `delay` unless cancelled first. Returns `false` on cancel.
    pub async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Streaming connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Subscribing,
    Streaming,
}

/// Poller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
}

/// Rate-limited reporting of decode failures.
///
/// A storm of malformed frames produces at most one log line per interval;
/// the counter still sees every failure.
#[derive(Debug)]
pub struct DecodeDiagnostics {
    interval: Duration,
    last_logged: Option<Instant>,
    suppressed: u64,
}

impl DecodeDiagnostics {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_logged: None, suppressed: 0 }
    }

    /// Record one failure; returns whether it was logged.
    pub fn report(&mut self, label: &str, err: &DecodeError) -> bool {
        let due = self.last_logged.is_none_or(|t| t.elapsed() >= self.interval);
        if due {
            warn!("[{label}] decode error: {err} ({} suppressed since last report)", self.suppressed);
            self.last_logged = Some(Instant::now());
            self.suppressed = 0;
        } else {
            self.suppressed += 1;
        }
        due
    }
}
