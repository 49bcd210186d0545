//! Health and statistics reporting for the resource coordinator.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of coordinator load.
///
/// Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthSnapshot {
    /// Timers currently registered.
    pub active_timers: usize,
    /// Subscriptions currently registered.
    pub active_subscriptions: usize,
    /// Events waiting in the priority queue.
    pub queued_events: usize,
    /// True iff all three counts are strictly below their caps.
    pub is_healthy: bool,
}

/// Coordinator diagnostics: current load plus lifetime counters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoordinatorStats {
    pub health: HealthSnapshot,
    /// Timer callbacks invoked.
    pub timers_fired: u64,
    /// Callbacks that returned an error or panicked.
    pub callback_failures: u64,
    /// Registrations refused because a registry was full.
    pub rejected_registrations: u64,
    /// Queued events executed.
    pub events_processed: u64,
    /// Queued events evicted on overflow.
    pub events_dropped: u64,
}

/// Lifetime counters, updated lock-free from any task.
#[derive(Debug, Default)]
pub(super) struct CoordinatorCounters {
    timers_fired: AtomicU64,
    callback_failures: AtomicU64,
    rejected_registrations: AtomicU64,
    events_processed: AtomicU64,
    events_dropped: AtomicU64,
}

impl CoordinatorCounters {
    pub(super) fn timer_fired(&self) {
        self.timers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn callback_failed(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn registration_rejected(&self) {
        self.rejected_registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn stats(&self, health: HealthSnapshot) -> CoordinatorStats {
        CoordinatorStats {
            health,
            timers_fired: self.timers_fired.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            rejected_registrations: self.rejected_registrations.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}
