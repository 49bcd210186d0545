//! Exponential backoff for retryable network failures.

use super::error::NetworkError;
use std::time::Duration;

/// Default number of attempts per call, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Default upper bound for any single retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Retry schedule applied inside a closed circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per call, including the first. 1 disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based) after `error`.
    ///
    /// `base_delay * 2^retry`, raised to the provider's `retry_after` hint
    /// when that is longer, never above `max_delay`.
    pub fn delay_for(&self, retry: u32, error: &NetworkError) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        let backoff = self.base_delay.saturating_mul(factor);
        let delay = match error {
            NetworkError::RateLimited {
                retry_after: Some(hint),
            } => backoff.max(*hint),
            _ => backoff,
        };
        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let error = NetworkError::Transient("reset".into());
        assert_eq!(policy.delay_for(0, &error), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1, &error), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2, &error), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10, &error), DEFAULT_MAX_DELAY);
        assert_eq!(policy.delay_for(u32::MAX, &error), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn test_retry_after_hint_wins_when_longer() {
        let policy = RetryPolicy::default();
        let hinted = NetworkError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(policy.delay_for(0, &hinted), Duration::from_secs(2));

        let huge = NetworkError::RateLimited {
            retry_after: Some(Duration::from_secs(600)),
        };
        assert_eq!(policy.delay_for(0, &huge), DEFAULT_MAX_DELAY);
    }
}
