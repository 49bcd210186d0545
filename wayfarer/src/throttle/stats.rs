//! Throttle counters exposed to recovery and diagnostics.

use std::collections::BTreeMap;
use std::time::Duration;

/// Counters for one event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventTypeStats {
    /// Calls received in the current rate window, including dropped ones.
    pub events_in_window: u32,
    /// Callbacks executed.
    pub fired: u64,
    /// Calls rejected because the window budget was exhausted.
    pub dropped: u64,
    /// Calls folded into an already pending call.
    pub coalesced: u64,
    /// Value-gated calls skipped because the value had not changed.
    pub unchanged: u64,
    /// A deferred call is waiting to fire.
    pub pending: bool,
    /// Time since the last callback fired.
    pub since_last_fire: Option<Duration>,
}

/// Snapshot of all event types the governor has seen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThrottleStats {
    pub types: BTreeMap<String, EventTypeStats>,
}

impl ThrottleStats {
    pub fn get(&self, kind: &str) -> Option<&EventTypeStats> {
        self.types.get(kind)
    }

    /// Event type with the most calls in its current window.
    pub fn busiest(&self) -> Option<(&str, &EventTypeStats)> {
        self.types
            .iter()
            .max_by_key(|(_, stats)| stats.events_in_window)
            .map(|(kind, stats)| (kind.as_str(), stats))
    }

    pub fn total_fired(&self) -> u64 {
        self.types.values().map(|stats| stats.fired).sum()
    }

    pub fn total_dropped(&self) -> u64 {
        self.types.values().map(|stats| stats.dropped).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busiest_and_totals() {
        let mut stats = ThrottleStats::default();
        stats.types.insert(
            "gesture".to_string(),
            EventTypeStats {
                events_in_window: 12,
                fired: 3,
                dropped: 2,
                ..Default::default()
            },
        );
        stats.types.insert(
            "search".to_string(),
            EventTypeStats {
                events_in_window: 4,
                fired: 1,
                ..Default::default()
            },
        );

        let (kind, busiest) = stats.busiest().unwrap();
        assert_eq!(kind, "gesture");
        assert_eq!(busiest.events_in_window, 12);
        assert_eq!(stats.total_fired(), 4);
        assert_eq!(stats.total_dropped(), 2);
        assert!(ThrottleStats::default().busiest().is_none());
    }
}
