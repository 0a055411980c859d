use std::time::Duration;

/// Default delay before the first retry (30 seconds).
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(30);

/// Default cap on the retry delay (5 hours).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5 * 60 * 60);

/// Exponential backoff applied when a worker returns `Retry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay to wait after the `attempt`-th failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}
