//! Overload detection and emergency recovery.
//!
//! The [`RecoveryMonitor`] periodically checks coordinator and throttle load,
//! collects failures reported by other components, and resets the system
//! when they cross a threshold.

mod config;
mod error;
mod hook;
mod monitor;

pub use config::{
    RecoveryConfig, DEFAULT_CLEANUP_INTERVAL, DEFAULT_EVENT_RATE_CEILING,
    DEFAULT_HEALTH_CHECK_INTERVAL, DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_MAX_EVENT_OVERLOADS,
    DEFAULT_RECOVERY_DELAY, DEFAULT_RETRY_DELAY,
};
pub use error::RecoveryError;
pub use hook::RecoveryHook;
pub use monitor::{
    FailureReporter, RecoveryMonitor, RecoveryPhase, RecoveryStats, CLEANUP_KEY, HEALTH_CHECK_KEY,
};
