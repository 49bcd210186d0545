//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.
//! Durations are stored in the unit their INI key names.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Timer and subscription caps
    pub coordinator: CoordinatorSettings,
    /// Throttle delays and rate budgets
    pub throttle: ThrottleSettings,
    /// Circuit breaker thresholds and retry schedule
    pub circuit: CircuitSettings,
    /// Overload detection and recovery timing
    pub recovery: RecoverySettings,
    /// Navigation tracking
    pub navigation: NavigationSettings,
    /// Logging output
    pub logging: LoggingSettings,
}

/// `[coordinator]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub max_timers: usize,
    pub max_subscriptions: usize,
    pub max_queued_events: usize,
}

/// `[throttle]`, `[throttle.delay_ms]` and `[throttle.max_per_second]` sections.
///
/// The per-type tables overlay the built-in table; types not listed keep
/// their built-in tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleSettings {
    pub default_delay_ms: u64,
    pub default_max_per_second: u32,
    pub delay_ms: BTreeMap<String, u64>,
    pub max_per_second: BTreeMap<String, u32>,
}

/// `[circuit]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitSettings {
    pub max_failures: u32,
    pub reset_timeout_secs: u64,
    pub half_open_timeout_secs: u64,
    pub call_timeout_secs: u64,
    /// Tripped duration after which a circuit is reported stuck open
    pub open_alert_after_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

/// `[recovery]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySettings {
    pub health_check_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub max_event_overloads: u32,
    pub max_consecutive_errors: u32,
    pub event_rate_ceiling: u32,
    pub recovery_delay_ms: u64,
    pub retry_delay_ms: u64,
}

/// `[navigation]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationSettings {
    pub sampling_interval_ms: u64,
    pub broadcast_interval_ms: u64,
    pub speed_smoothing: f64,
    pub min_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub waypoint_tolerance_m: f64,
    pub arrival_radius_m: f64,
    pub restore_max_age_secs: u64,
    pub autosave: bool,
    /// Directory for the saved-session store
    pub state_dir: PathBuf,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}
