//! Reconnect backoff policy.
//!
//! Delays double from `initial` up to `max`, with a random jitter of up to
//! `jitter` × the nominal delay added on top. Within one failure streak the
//! delays never decrease and never exceed `max`; a connection that delivers
//! data resets the streak.

use std::time::Duration;

use rand::Rng;

/// Adapter-declared backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffSpec {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Jitter as a fraction of the nominal delay, clamped to `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for BackoffSpec {
    fn default() -> Self {
        Self { initial: Duration::from_millis(100), max: Duration::from_secs(30), jitter: 0.2 }
    }
}

impl BackoffSpec {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, ..Default::default() }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Backoff state for one failure streak.
#[derive(Debug, Clone)]
pub struct Backoff {
    spec: BackoffSpec,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    pub fn new(spec: BackoffSpec) -> Self {
        Self { spec, attempt: 0, last: Duration::ZERO }
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Next delay to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let max = self.spec.max.max(self.spec.initial);
        let factor = 1u32.checked_shl(self.attempt.min(31)).unwrap_or(u32::MAX);
        let nominal = self.spec.initial.saturating_mul(factor).min(max);

        let jitter = self.spec.jitter.clamp(0.0, 1.0);
        let extra = if jitter > 0.0 {
            nominal.mul_f64(rand::thread_rng().gen_range(0.0..=jitter))
        } else {
            Duration::ZERO
        };

        let delay = (nominal + extra).min(max).max(self.last);
        self.last = delay;
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_non_decreasing_and_capped() {
        let spec = BackoffSpec::new(Duration::from_millis(10), Duration::from_millis(500)).with_jitter(0.5);
        for _ in 0..50 {
            let mut backoff = Backoff::new(spec);
            let mut prev = Duration::ZERO;
            for _ in 0..40 {
                let d = backoff.next_delay();
                assert!(d >= prev, "{d:?} < {prev:?}");
                assert!(d <= spec.max);
                prev = d;
            }
            assert_eq!(prev, spec.max);
        }
    }

    #[test]
    fn doubles_without_jitter() {
        let spec = BackoffSpec::new(Duration::from_millis(100), Duration::from_secs(1)).with_jitter(0.0);
        let mut backoff = Backoff::new(spec);
        let delays: Vec<u128> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn reset_restarts_streak() {
        let spec = BackoffSpec::new(Duration::from_millis(100), Duration::from_secs(1)).with_jitter(0.0);
        let mut backoff = Backoff::new(spec);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn huge_attempt_count_does_not_overflow() {
        let spec = BackoffSpec::new(Duration::from_secs(1), Duration::from_secs(60));
        let mut backoff = Backoff::new(spec);
        for _ in 0..200 {
            assert!(backoff.next_delay() <= Duration::from_secs(60));
        }
    }
}
