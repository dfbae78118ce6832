//! Exponential backoff for failed poll rounds.

use std::time::Duration;

/// Tracks consecutive round failures and the delay before the next attempt.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
    persistent_threshold: u32,
    consecutive_failures: u32,
}

impl RetryBackoff {
    pub fn new(base: Duration, max: Duration, persistent_threshold: u32) -> Self {
        Self {
            base,
            max,
            persistent_threshold,
            consecutive_failures: 0,
        }
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        compute_backoff(self.consecutive_failures, self.base, self.max)
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether failures have gone on long enough to be reported as errors.
    pub fn is_persistent(&self) -> bool {
        self.consecutive_failures >= self.persistent_threshold
    }
}

/// `base * 2^(failures - 1)`, capped at `max`.
///
/// | Failures | Delay (base=100ms, max=30s) |
/// |----------|-----------------------------|
/// | 0        | 0                           |
/// | 1        | 100ms                       |
/// | 2        | 200ms                       |
/// | 3        | 400ms                       |
/// | 10+      | 30s                         |
pub fn compute_backoff(failures: u32, base: Duration, max: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let multiplier = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_backoff_caps_and_grows() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(10);

        assert_eq!(compute_backoff(0, base, max), Duration::ZERO);
        assert_eq!(compute_backoff(1, base, max), Duration::from_secs(2));
        assert_eq!(compute_backoff(2, base, max), Duration::from_secs(4));
        assert_eq!(compute_backoff(3, base, max), Duration::from_secs(8));
        assert_eq!(compute_backoff(4, base, max), Duration::from_secs(10));
        assert_eq!(compute_backoff(200, base, max), Duration::from_secs(10));
    }

    #[test]
    fn backoff_escalates_and_resets() {
        let mut backoff =
            RetryBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 3);

        assert_eq!(backoff.record_failure(), Duration::from_millis(100));
        assert_eq!(backoff.record_failure(), Duration::from_millis(200));
        assert!(!backoff.is_persistent());
        assert_eq!(backoff.record_failure(), Duration::from_millis(400));
        assert!(backoff.is_persistent());

        backoff.reset();
        assert_eq!(backoff.consecutive_failures(), 0);
        assert!(!backoff.is_persistent());
        assert_eq!(backoff.record_failure(), Duration::from_millis(100));
    }
}
