//! Service error types.

use crate::config::ConfigFileError;
use crate::navigation::StoreError;
use crate::recovery::RecoveryError;
use thiserror::Error;

/// Errors that can occur while assembling the core services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No scheduler given and no Tokio runtime to derive one from
    #[error("No async runtime available; build inside a Tokio runtime or supply a scheduler")]
    NoRuntime,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigFileError),

    /// Saved-session store could not be opened
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    /// Recovery monitoring could not be started
    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_wraps_message() {
        let err = ServiceError::from(ConfigFileError::InvalidValue {
            section: "coordinator".to_string(),
            key: "max_timers".to_string(),
            value: "0".to_string(),
            reason: "must be a positive integer".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: coordinator.max_timers = '0' - must be a positive integer"
        );
    }
}
