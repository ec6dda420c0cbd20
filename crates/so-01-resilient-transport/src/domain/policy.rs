//! Retry policy.

use std::time::Duration;

/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Default sleep between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed-interval retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Sleep between consecutive attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Policy with explicit values.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Single attempt, no sleeping.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Effective attempt budget.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL)
    }
}
