//! Time utilities.
//!
//! Wall-clock timestamps for message receipt.

use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
fn since_epoch() -> std::time::Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    since_epoch().as_millis() as u64
}

/// Receipt stamp that never goes backwards, even if the wall clock does.
///
/// One per connection: messages from a single connection carry
/// non-decreasing `received_at` values.
#[derive(Debug, Default)]
pub struct ReceiptClock {
    last_ms: u64,
}

impl ReceiptClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn stamp(&mut self) -> u64 {
        self.last_ms = self.last_ms.max(now_ms());
        self.last_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_ms_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn receipt_clock_is_monotonic() {
        let mut clock = ReceiptClock { last_ms: u64::MAX - 1 };
        assert_eq!(clock.stamp(), u64::MAX - 1);

        let mut clock = ReceiptClock::new();
        let a = clock.stamp();
        let b = clock.stamp();
        assert!(b >= a);
    }
}
