//! Capacity limits for the resource coordinator.

use crate::config::CoordinatorSettings;

/// Default maximum number of active timers.
pub const DEFAULT_MAX_TIMERS: usize = 15;

/// Default maximum number of active stream subscriptions.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 20;

/// Default bound of the priority event queue.
pub const DEFAULT_MAX_QUEUED_EVENTS: usize = 100;

/// Configuration for the resource coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Registrations beyond this many active timers are rejected.
    pub max_timers: usize,
    /// Registrations beyond this many active subscriptions are rejected.
    pub max_subscriptions: usize,
    /// Oldest queued events are evicted beyond this bound.
    pub max_queued_events: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_timers: DEFAULT_MAX_TIMERS,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            max_queued_events: DEFAULT_MAX_QUEUED_EVENTS,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_settings(settings: &CoordinatorSettings) -> Self {
        Self {
            max_timers: settings.max_timers,
            max_subscriptions: settings.max_subscriptions,
            max_queued_events: settings.max_queued_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_timers, 15);
        assert_eq!(config.max_subscriptions, 20);
        assert_eq!(config.max_queued_events, 100);
    }
    #[test]
    fn test_from_default_settings() {
        let settings = crate::config::ConfigFile::default().coordinator;
        assert_eq!(CoordinatorConfig::from_settings(&settings), CoordinatorConfig::default());
    }
}
