//! Thresholds and timings for the recovery monitor.

use crate::config::RecoverySettings;
use std::time::Duration;

pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_EVENT_OVERLOADS: u32 = 10;
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;
/// Calls per second for any single event type above which a check counts
/// as an overload.
pub const DEFAULT_EVENT_RATE_CEILING: u32 = 50;
pub const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Configuration for the recovery monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryConfig {
    pub health_check_interval: Duration,
    pub cleanup_interval: Duration,
    /// Overloads that trigger emergency recovery.
    pub max_event_overloads: u32,
    /// Reported errors that trigger emergency recovery.
    pub max_consecutive_errors: u32,
    pub event_rate_ceiling: u32,
    /// Pause between teardown and restart during recovery.
    pub recovery_delay: Duration,
    /// Wait before the single retry of a failed recovery.
    pub retry_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            max_event_overloads: DEFAULT_MAX_EVENT_OVERLOADS,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            event_rate_ceiling: DEFAULT_EVENT_RATE_CEILING,
            recovery_delay: DEFAULT_RECOVERY_DELAY,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RecoveryConfig {
    pub fn from_settings(settings: &RecoverySettings) -> Self {
        Self {
            health_check_interval: Duration::from_secs(settings.health_check_interval_secs),
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_secs),
            max_event_overloads: settings.max_event_overloads,
            max_consecutive_errors: settings.max_consecutive_errors,
            event_rate_ceiling: settings.event_rate_ceiling,
            recovery_delay: Duration::from_millis(settings.recovery_delay_ms),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    #[test]
    fn test_from_default_settings() {
        let settings = ConfigFile::default().recovery;
        assert_eq!(RecoveryConfig::from_settings(&settings), RecoveryConfig::default());
    }
}
