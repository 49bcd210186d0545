//! Error types for the resource coordinator.

use std::fmt;
use thiserror::Error;

/// Which registry a timed task or binding lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// One-shot or periodic timer.
    Timer,
    /// Stream subscription.
    Subscription,
}

impl ResourceKind {
    /// Returns the kind name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Timer => "timer",
            ResourceKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by registration requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// The registry is at capacity; the caller proceeds without the resource.
    #[error("{kind} capacity exhausted ({active}/{cap}), rejected '{key}'")]
    ResourceExhausted {
        kind: ResourceKind,
        key: String,
        active: usize,
        cap: usize,
    },
}

/// Failure reported by a registered callback.
///
/// Returning this from a timer or subscription callback removes that one
/// registration (timers) or skips that one item (subscriptions). Nothing
/// else is affected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Result type for coordinator callbacks.
pub type CallbackResult = Result<(), CallbackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_exhausted_message() {
        let error = CoordinatorError::ResourceExhausted {
            kind: ResourceKind::Subscription,
            key: "gps".to_string(),
            active: 20,
            cap: 20,
        };
        assert_eq!(
            error.to_string(),
            "subscription capacity exhausted (20/20), rejected 'gps'"
        );
    }

    #[test]
    fn test_callback_error_conversions() {
        let from_str: CallbackError = "boom".into();
        let from_string: CallbackError = String::from("boom").into();
        assert_eq!(from_str, from_string);
        assert_eq!(from_str.message(), "boom");
        assert_eq!(from_str.to_string(), "boom");
    }
}
