use crate::coordinator::CoordinatorError;
use thiserror::Error;

/// Errors raised while starting monitoring or recovering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    /// A monitor timer could not be registered.
    #[error("failed to register '{key}': {source}")]
    Registration {
        key: String,
        #[source]
        source: CoordinatorError,
    },

    /// A component could not re-arm itself after recovery.
    #[error("recovery hook '{hook}' failed: {reason}")]
    Hook { hook: String, reason: String },
}
