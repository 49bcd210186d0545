//! Circuit breaker thresholds and timeouts.

use super::retry::RetryPolicy;
use crate::config::CircuitSettings;
use std::time::Duration;

/// Default consecutive failures that open the circuit.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Default time an open circuit waits before allowing a trial call.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time a half-open circuit waits for a trial before self-closing.
pub const DEFAULT_HALF_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a circuit may stay tripped before it is reported stuck.
pub const DEFAULT_OPEN_ALERT_AFTER: Duration = Duration::from_secs(600);

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit (default: 3).
    pub max_failures: u32,
    /// Open duration before the next call is let through as a trial (default: 60s).
    pub reset_timeout: Duration,
    /// Half-open duration after which an untried circuit closes (default: 30s).
    pub half_open_timeout: Duration,
    /// Timeout applied to every call unless overridden (default: 10s).
    pub call_timeout: Duration,
    /// Tripped duration after which the circuit is reported stuck (default: 10min).
    pub open_alert_after: Duration,
    /// Retries for retryable failures while closed.
    pub retry: RetryPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            half_open_timeout: DEFAULT_HALF_OPEN_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            open_alert_after: DEFAULT_OPEN_ALERT_AFTER,
            retry: RetryPolicy::default(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn from_settings(settings: &CircuitSettings) -> Self {
        Self {
            max_failures: settings.max_failures,
            reset_timeout: Duration::from_secs(settings.reset_timeout_secs),
            half_open_timeout: Duration::from_secs(settings.half_open_timeout_secs),
            call_timeout: Duration::from_secs(settings.call_timeout_secs),
            open_alert_after: Duration::from_secs(settings.open_alert_after_secs),
            retry: RetryPolicy {
                max_attempts: settings.retry_max_attempts.max(1),
                base_delay: Duration::from_millis(settings.retry_base_delay_ms),
                max_delay: Duration::from_millis(settings.retry_max_delay_ms),
            },
        }
    }
}
