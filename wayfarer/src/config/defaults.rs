//! Default values for all configuration settings.
//!
//! Component tuning defaults are owned by the components themselves; this
//! module maps them into the settings structs and adds the file-level
//! defaults (paths, log names).

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::settings::*;
use crate::circuit::{
    RetryPolicy, DEFAULT_CALL_TIMEOUT, DEFAULT_HALF_OPEN_TIMEOUT, DEFAULT_MAX_FAILURES,
    DEFAULT_OPEN_ALERT_AFTER, DEFAULT_RESET_TIMEOUT,
};
use crate::coordinator::{DEFAULT_MAX_QUEUED_EVENTS, DEFAULT_MAX_SUBSCRIPTIONS, DEFAULT_MAX_TIMERS};
use crate::navigation::{
    DEFAULT_ARRIVAL_RADIUS_M, DEFAULT_BROADCAST_INTERVAL, DEFAULT_MAX_SPEED_KMH,
    DEFAULT_MIN_SPEED_KMH, DEFAULT_RESTORE_MAX_AGE, DEFAULT_SAMPLING_INTERVAL,
    DEFAULT_SPEED_SMOOTHING, DEFAULT_WAYPOINT_TOLERANCE_M,
};
use crate::recovery::{
    DEFAULT_CLEANUP_INTERVAL, DEFAULT_EVENT_RATE_CEILING, DEFAULT_HEALTH_CHECK_INTERVAL,
    DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_MAX_EVENT_OVERLOADS, DEFAULT_RECOVERY_DELAY,
    DEFAULT_RETRY_DELAY,
};
use crate::throttle::{DEFAULT_DELAY, DEFAULT_MAX_PER_SECOND};

/// Name of the directory under the home directory holding config and state.
pub const CONFIG_DIR_NAME: &str = ".wayfarer";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "wayfarer.log";

/// Get the path to the config directory (~/.wayfarer).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the path to the config file (~/.wayfarer/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Default log directory (~/.wayfarer/logs).
pub fn default_log_dir() -> PathBuf {
    config_directory().join("logs")
}

/// Default saved-session directory (~/.wayfarer/state).
pub fn default_state_dir() -> PathBuf {
    config_directory().join("state")
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_timers: DEFAULT_MAX_TIMERS,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            max_queued_events: DEFAULT_MAX_QUEUED_EVENTS,
        }
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            default_delay_ms: DEFAULT_DELAY.as_millis() as u64,
            default_max_per_second: DEFAULT_MAX_PER_SECOND,
            delay_ms: BTreeMap::new(),
            max_per_second: BTreeMap::new(),
        }
    }
}

impl Default for CircuitSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout_secs: DEFAULT_RESET_TIMEOUT.as_secs(),
            half_open_timeout_secs: DEFAULT_HALF_OPEN_TIMEOUT.as_secs(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
            open_alert_after_secs: DEFAULT_OPEN_ALERT_AFTER.as_secs(),
            retry_max_attempts: retry.max_attempts,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            retry_max_delay_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_INTERVAL.as_secs(),
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL.as_secs(),
            max_event_overloads: DEFAULT_MAX_EVENT_OVERLOADS,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            event_rate_ceiling: DEFAULT_EVENT_RATE_CEILING,
            recovery_delay_ms: DEFAULT_RECOVERY_DELAY.as_millis() as u64,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
        }
    }
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL.as_millis() as u64,
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL.as_millis() as u64,
            speed_smoothing: DEFAULT_SPEED_SMOOTHING,
            min_speed_kmh: DEFAULT_MIN_SPEED_KMH,
            max_speed_kmh: DEFAULT_MAX_SPEED_KMH,
            waypoint_tolerance_m: DEFAULT_WAYPOINT_TOLERANCE_M,
            arrival_radius_m: DEFAULT_ARRIVAL_RADIUS_M,
            restore_max_age_secs: DEFAULT_RESTORE_MAX_AGE.as_secs(),
            autosave: true,
            state_dir: default_state_dir(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorSettings::default(),
            throttle: ThrottleSettings::default(),
            circuit: CircuitSettings::default(),
            recovery: RecoverySettings::default(),
            navigation: NavigationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
