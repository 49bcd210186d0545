//! Circuit breaking for unreliable network operations.
//!
//! Routing and other provider calls can stall, time out or be rate limited.
//! A [`CircuitBreaker`] stops repeated failures from compounding while the
//! provider recovers, and lets callers degrade gracefully with a fallback.
//! [`CircuitRegistry`] keeps one breaker per operation class.

mod breaker;
mod config;
mod error;
mod registry;
mod retry;

pub use breaker::{CallOptions, CircuitBreaker, CircuitPhase, CircuitStats};
pub use config::{
    CircuitBreakerConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_HALF_OPEN_TIMEOUT, DEFAULT_MAX_FAILURES,
    DEFAULT_OPEN_ALERT_AFTER, DEFAULT_RESET_TIMEOUT,
};
pub use error::{CircuitError, NetworkError};
pub use registry::{classes, CircuitRegistry};
pub use retry::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
