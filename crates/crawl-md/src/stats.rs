//! Per-session diagnostic counters.
//!
//! Runtime faults never reach the caller; these counters are how they stay
//! visible. Every field is updated atomically from connection tasks and the
//! dispatch thread.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    decode_errors: AtomicU64,
    reconnects: AtomicU64,
    connect_attempts: AtomicU64,
    fetch_errors: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a session's [`Counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Messages handed to the consumer callback.
    pub delivered: u64,
    /// Messages evicted from a full per-connection buffer.
    pub dropped: u64,
    /// Frames that failed to decode and were skipped.
    pub decode_errors: u64,
    /// Reconnects after an unexpected disconnect or failed connect.
    pub reconnects: u64,
    /// Streaming connects attempted, successful or not.
    pub connect_attempts: u64,
    /// Failed REST requests (polls and symbol discovery).
    pub fetch_errors: u64,
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "delivered={} dropped={} decode_errors={} reconnects={} connect_attempts={} fetch_errors={}",
            self.delivered, self.dropped, self.decode_errors, self.reconnects, self.connect_attempts, self.fetch_errors,
        )
    }
}
