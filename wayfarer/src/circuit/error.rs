//! Error types for circuit-protected network calls.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single network operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The call did not complete within its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider asked us to slow down.
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Connection reset, DNS hiccup and similar short-lived faults.
    #[error("transient network failure: {0}")]
    Transient(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0}")]
    Other(String),
}

impl NetworkError {
    /// Returns true if another attempt may succeed.
    ///
    /// Rate limits, transient faults and 5xx responses are retried.
    /// Timeouts and authentication failures fail fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::RateLimited { .. } | NetworkError::Transient(_) => true,
            NetworkError::Server { status, .. } => *status >= 500,
            NetworkError::Timeout(_) | NetworkError::Authentication(_) | NetworkError::Other(_) => {
                false
            }
        }
    }
}

/// Errors returned by [`CircuitBreaker::execute`](super::CircuitBreaker::execute).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitError {
    /// The breaker rejected the call without running it.
    #[error("circuit '{name}' is open, retry in {retry_in:?}")]
    Open { name: String, retry_in: Duration },

    /// The call ran and failed after any retries.
    #[error("circuit '{name}' call failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: NetworkError,
    },
}

impl CircuitError {
    /// Returns true if the call was rejected by an open circuit.
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }
}
