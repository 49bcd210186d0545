//! Navigation tracker tuning.

use crate::config::NavigationSettings;
use std::time::Duration;

pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(2);
/// Weight of the previous speed in the moving average.
pub const DEFAULT_SPEED_SMOOTHING: f64 = 0.7;
pub const DEFAULT_MIN_SPEED_KMH: f64 = 1.0;
pub const DEFAULT_MAX_SPEED_KMH: f64 = 120.0;
pub const DEFAULT_WAYPOINT_TOLERANCE_M: f64 = 100.0;
pub const DEFAULT_ARRIVAL_RADIUS_M: f64 = 50.0;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;
pub const DEFAULT_STATE_KEY: &str = "navigation.session";
pub const DEFAULT_RESTORE_MAX_AGE: Duration = Duration::from_secs(3600);

/// Configuration for the navigation tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationConfig {
    /// How often the position source is polled (default: 1s).
    pub sampling_interval: Duration,
    /// How often progress is re-broadcast without new fixes (default: 2s).
    pub broadcast_interval: Duration,
    /// EMA weight `a` in `speed' = speed * a + sample * (1 - a)` (default: 0.7).
    pub speed_smoothing: f64,
    pub min_speed_kmh: f64,
    pub max_speed_kmh: f64,
    /// Route points within this distance count as reached (default: 100m).
    pub waypoint_tolerance_m: f64,
    /// Distance to destination that counts as arrival (default: 50m).
    pub arrival_radius_m: f64,
    /// Buffered progress events per observer.
    pub channel_capacity: usize,
    /// Store key used by save/restore.
    pub state_key: String,
    /// Saved sessions older than this are discarded on restore (default: 1h).
    pub restore_max_age: Duration,
    /// Save the session after every accepted position.
    pub autosave: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            speed_smoothing: DEFAULT_SPEED_SMOOTHING,
            min_speed_kmh: DEFAULT_MIN_SPEED_KMH,
            max_speed_kmh: DEFAULT_MAX_SPEED_KMH,
            waypoint_tolerance_m: DEFAULT_WAYPOINT_TOLERANCE_M,
            arrival_radius_m: DEFAULT_ARRIVAL_RADIUS_M,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            state_key: DEFAULT_STATE_KEY.to_string(),
            restore_max_age: DEFAULT_RESTORE_MAX_AGE,
            autosave: true,
        }
    }
}

impl NavigationConfig {
    /// Convert file settings. The store location is not part of the
    /// tracker config; callers build the store from `settings.state_dir`.
    pub fn from_settings(settings: &NavigationSettings) -> Self {
        Self {
            sampling_interval: Duration::from_millis(settings.sampling_interval_ms),
            broadcast_interval: Duration::from_millis(settings.broadcast_interval_ms),
            speed_smoothing: settings.speed_smoothing,
            min_speed_kmh: settings.min_speed_kmh,
            max_speed_kmh: settings.max_speed_kmh,
            waypoint_tolerance_m: settings.waypoint_tolerance_m,
            arrival_radius_m: settings.arrival_radius_m,
            restore_max_age: Duration::from_secs(settings.restore_max_age_secs),
            autosave: settings.autosave,
            ..Self::default()
        }
    }

    /// Speed clamp range in m/s.
    pub fn speed_bounds_mps(&self) -> (f64, f64) {
        (self.min_speed_kmh / 3.6, self.max_speed_kmh / 3.6)
    }
}
