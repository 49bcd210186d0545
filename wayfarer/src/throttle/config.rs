//! Per-event-type delay and rate tables.

use crate::config::ThrottleSettings;
use std::collections::BTreeMap;
use std::time::Duration;

/// Well-known event types and their default tuning.
pub mod kinds {
    pub const LOCATION_UPDATE: &str = "location_update";
    pub const MAP_MOVE: &str = "map_move";
    pub const GESTURE: &str = "gesture";
    pub const UI_REFRESH: &str = "ui_refresh";
    pub const NAVIGATION_PROGRESS: &str = "navigation_progress";
    pub const SEARCH: &str = "search";
    pub const ROUTE_REQUEST: &str = "route_request";

    /// (type, delay in ms, max events per second)
    pub(crate) const DEFAULTS: &[(&str, u64, u32)] = &[
        (LOCATION_UPDATE, 1000, 5),
        (MAP_MOVE, 300, 10),
        (GESTURE, 100, 20),
        (UI_REFRESH, 33, 30),
        (NAVIGATION_PROGRESS, 500, 4),
        (SEARCH, 500, 5),
        (ROUTE_REQUEST, 2000, 1),
    ];
}

/// Delay applied to event types missing from the table.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// Per-second budget for event types missing from the table.
pub const DEFAULT_MAX_PER_SECOND: u32 = 10;

/// Length of the rolling rate window.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Configuration for the throttle governor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Delay before a coalesced or debounced call fires, per event type.
    pub delays: BTreeMap<String, Duration>,
    /// Events accepted per rate window, per event type.
    pub max_per_second: BTreeMap<String, u32>,
    /// Delay for unlisted event types.
    pub default_delay: Duration,
    /// Budget for unlisted event types.
    pub default_max_per_second: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        let mut config = Self::empty();
        for &(kind, delay_ms, max) in kinds::DEFAULTS {
            config = config.with_type(kind, Duration::from_millis(delay_ms), max);
        }
        config
    }
}

impl ThrottleConfig {
    /// Configuration with no per-type entries; everything uses the defaults.
    pub fn empty() -> Self {
        Self {
            delays: BTreeMap::new(),
            max_per_second: BTreeMap::new(),
            default_delay: DEFAULT_DELAY,
            default_max_per_second: DEFAULT_MAX_PER_SECOND,
        }
    }

    /// Set or override tuning for one event type.
    pub fn with_type(mut self, kind: impl Into<String>, delay: Duration, max_per_second: u32) -> Self {
        let kind = kind.into();
        self.delays.insert(kind.clone(), delay);
        self.max_per_second.insert(kind, max_per_second);
        self
    }

    /// Built-in table overlaid with the configured entries.
    pub fn from_settings(settings: &ThrottleSettings) -> Self {
        let mut config = Self {
            default_delay: Duration::from_millis(settings.default_delay_ms),
            default_max_per_second: settings.default_max_per_second,
            ..Self::default()
        };
        for (kind, delay_ms) in &settings.delay_ms {
            config.delays.insert(kind.clone(), Duration::from_millis(*delay_ms));
        }
        for (kind, max) in &settings.max_per_second {
            config.max_per_second.insert(kind.clone(), *max);
        }
        config
    }

    pub fn delay_for(&self, kind: &str) -> Duration {
        self.delays.get(kind).copied().unwrap_or(self.default_delay)
    }

    pub fn max_per_second_for(&self, kind: &str) -> u32 {
        self.max_per_second
            .get(kind)
            .copied()
            .unwrap_or(self.default_max_per_second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let config = ThrottleConfig::default();
        assert_eq!(config.delay_for(kinds::LOCATION_UPDATE), Duration::from_secs(1));
        assert_eq!(config.max_per_second_for(kinds::UI_REFRESH), 30);
        assert_eq!(config.delay_for(kinds::ROUTE_REQUEST), Duration::from_secs(2));
        assert_eq!(config.max_per_second_for(kinds::ROUTE_REQUEST), 1);
        assert_eq!(config.delays.len(), kinds::DEFAULTS.len());
    }

    #[test]
    fn test_unlisted_type_uses_defaults() {
        let config = ThrottleConfig::default();
        assert_eq!(config.delay_for("custom"), DEFAULT_DELAY);
        assert_eq!(config.max_per_second_for("custom"), DEFAULT_MAX_PER_SECOND);
    }

    #[test]
    fn test_with_type_overrides() {
        let config = ThrottleConfig::default().with_type(kinds::GESTURE, Duration::from_millis(5), 99);
        assert_eq!(config.delay_for(kinds::GESTURE), Duration::from_millis(5));
        assert_eq!(config.max_per_second_for(kinds::GESTURE), 99);
    }
}
