//! Per-event-type throttling, debouncing and rate limiting.

use super::config::{ThrottleConfig, RATE_WINDOW};
use super::stats::{EventTypeStats, ThrottleStats};
use crate::coordinator::panic_message;
use crate::recovery::FailureReporter;
use crate::scheduler::{ExecutionLane, SharedScheduler};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type DeferredCall = Box<dyn FnOnce() + Send>;

/// What a throttle, debounce or value-gated call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleOutcome {
    /// A new deferred call was scheduled.
    Scheduled,
    /// The call replaced the callback of an already pending call.
    Coalesced,
    /// The per-second budget was exhausted; the callback was discarded.
    Dropped,
    /// The value matched the last recorded value; nothing was scheduled.
    Unchanged,
}

struct Pending {
    id: u64,
    token: CancellationToken,
    callback: DeferredCall,
}

struct ThrottleState {
    window_start: Instant,
    events_in_window: u32,
    /// A drop in the current window was already reported.
    overflow_reported: bool,
    pending: Option<Pending>,
    last_value: Option<Box<dyn Any + Send>>,
    last_fired_at: Option<Instant>,
    fired: u64,
    dropped: u64,
    coalesced: u64,
    unchanged: u64,
}

impl ThrottleState {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            events_in_window: 0,
            overflow_reported: false,
            pending: None,
            last_value: None,
            last_fired_at: None,
            fired: 0,
            dropped: 0,
            coalesced: 0,
            unchanged: 0,
        }
    }

    /// Count one call against the rolling window.
    ///
    /// Returns false when the call exceeds the budget.
    fn admit(&mut self, now: Instant, max_per_second: u32) -> bool {
        if now.saturating_duration_since(self.window_start) > RATE_WINDOW {
            self.window_start = now;
            self.events_in_window = 0;
            self.overflow_reported = false;
        }
        self.events_in_window = self.events_in_window.saturating_add(1);
        if self.events_in_window > max_per_second {
            self.dropped += 1;
            return false;
        }
        true
    }

    /// Returns true for the first drop of the current window.
    fn first_overflow(&mut self) -> bool {
        !std::mem::replace(&mut self.overflow_reported, true)
    }

    fn snapshot(&self, now: Instant) -> EventTypeStats {
        let window_expired = now.saturating_duration_since(self.window_start) > RATE_WINDOW;
        EventTypeStats {
            events_in_window: if window_expired { 0 } else { self.events_in_window },
            fired: self.fired,
            dropped: self.dropped,
            coalesced: self.coalesced,
            unchanged: self.unchanged,
            pending: self.pending.is_some(),
            since_last_fire: self
                .last_fired_at
                .map(|at| now.saturating_duration_since(at)),
        }
    }
}

struct Inner {
    config: ThrottleConfig,
    scheduler: SharedScheduler,
    lane: ExecutionLane,
    states: Mutex<HashMap<String, ThrottleState>>,
    next_id: AtomicU64,
    reporter: FailureReporter,
}

/// Rate limiter and coalescer for high-frequency signals.
///
/// Each event type has its own delay and per-second budget (see
/// [`ThrottleConfig`]). Deferred callbacks run on the execution lane, so
/// they never overlap coordinator callbacks sharing the same lane.
///
/// - [`throttle`](Self::throttle): each admitted call cancels the pending
///   one and restarts the delay, so a burst collapses into one execution of
///   the most recent callback. Calls beyond the budget are dropped.
/// - [`debounce`](Self::debounce): same trailing edge, but calls are only
///   counted against the budget, never dropped.
/// - [`throttle_with_value`](Self::throttle_with_value): like `throttle`,
///   but a value equal to the last recorded one is skipped outright.
#[derive(Clone)]
pub struct ThrottleGovernor {
    inner: Arc<Inner>,
}

impl ThrottleGovernor {
    pub fn new(config: ThrottleConfig, scheduler: SharedScheduler) -> Self {
        Self::with_lane(config, scheduler, ExecutionLane::new())
    }

    pub fn with_lane(config: ThrottleConfig, scheduler: SharedScheduler, lane: ExecutionLane) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                scheduler,
                lane,
                states: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                reporter: FailureReporter::new(),
            }),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.inner.config
    }

    /// Receives one overload per event type and window in which the budget
    /// was exceeded.
    pub fn failure_reporter(&self) -> &FailureReporter {
        &self.inner.reporter
    }

    pub fn throttle<F>(&self, event_type: &str, callback: F) -> ThrottleOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        let now = self.inner.scheduler.now();
        let max = self.inner.config.max_per_second_for(event_type);
        let first_overflow = {
            let mut states = self.inner.states.lock();
            let state = states
                .entry(event_type.to_string())
                .or_insert_with(|| ThrottleState::new(now));

            if state.admit(now, max) {
                return self.coalesce_or_schedule(state, event_type, Box::new(callback));
            }
            state.first_overflow()
        };
        self.dropped(event_type, max, first_overflow)
    }

    pub fn debounce<F>(&self, event_type: &str, callback: F) -> ThrottleOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        let now = self.inner.scheduler.now();
        let max = self.inner.config.max_per_second_for(event_type);
        let mut states = self.inner.states.lock();
        let state = states
            .entry(event_type.to_string())
            .or_insert_with(|| ThrottleState::new(now));

        // Counted for overload detection, never dropped.
        let _ = state.admit(now, u32::MAX);
        if state.events_in_window > max {
            trace!(event_type, events = state.events_in_window, "Debounced type above budget");
        }

        self.coalesce_or_schedule(state, event_type, Box::new(callback))
    }

    pub fn throttle_with_value<V, F>(&self, event_type: &str, value: V, callback: F) -> ThrottleOutcome
    where
        V: PartialEq + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let now = self.inner.scheduler.now();
        let max = self.inner.config.max_per_second_for(event_type);
        let first_overflow = {
            let mut states = self.inner.states.lock();
            let state = states
                .entry(event_type.to_string())
                .or_insert_with(|| ThrottleState::new(now));

            let unchanged = state
                .last_value
                .as_ref()
                .and_then(|last| last.downcast_ref::<V>())
                .is_some_and(|last| *last == value);
            if unchanged {
                state.unchanged += 1;
                trace!(event_type, "Value unchanged, skipping");
                return ThrottleOutcome::Unchanged;
            }

            if state.admit(now, max) {
                state.last_value = Some(Box::new(value));
                return self.coalesce_or_schedule(state, event_type, Box::new(callback));
            }
            state.first_overflow()
        };
        self.dropped(event_type, max, first_overflow)
    }

    /// Per-type counters. Types never seen are absent.
    pub fn stats(&self) -> ThrottleStats {
        let now = self.inner.scheduler.now();
        let states = self.inner.states.lock();
        ThrottleStats {
            types: states
                .iter()
                .map(|(kind, state)| (kind.clone(), state.snapshot(now)))
                .collect(),
        }
    }

    /// Zero all counters and rate windows. Pending calls and recorded values
    /// are kept.
    pub fn reset_stats(&self) {
        let now = self.inner.scheduler.now();
        let mut states = self.inner.states.lock();
        for state in states.values_mut() {
            state.window_start = now;
            state.events_in_window = 0;
            state.overflow_reported = false;
            state.fired = 0;
            state.dropped = 0;
            state.coalesced = 0;
            state.unchanged = 0;
        }
        debug!(types = states.len(), "Throttle stats reset");
    }

    /// Cancel every pending call and forget all per-type state.
    pub fn clear(&self) {
        let states = std::mem::take(&mut *self.inner.states.lock());
        let mut cancelled = 0usize;
        for state in states.into_values() {
            if let Some(pending) = state.pending {
                pending.token.cancel();
                cancelled += 1;
            }
        }
        debug!(cancelled, "Throttle state cleared");
    }

    /// Release spare capacity in the state table.
    pub fn reclaim_memory(&self) {
        self.inner.states.lock().shrink_to_fit();
    }

    /// Number of deferred calls waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.inner
            .states
            .lock()
            .values()
            .filter(|state| state.pending.is_some())
            .count()
    }

    /// Called with the state lock released.
    fn dropped(&self, event_type: &str, max: u32, first_overflow: bool) -> ThrottleOutcome {
        debug!(event_type, max_per_second = max, "Throttle budget exhausted, dropping event");
        if first_overflow {
            self.inner.reporter.report_event_overload();
        }
        ThrottleOutcome::Dropped
    }

    /// Cancel any pending call for the type and schedule `callback` after
    /// the type's full delay.
    fn coalesce_or_schedule(
        &self,
        state: &mut ThrottleState,
        event_type: &str,
        callback: DeferredCall,
    ) -> ThrottleOutcome {
        let outcome = match state.pending.take() {
            Some(previous) => {
                previous.token.cancel();
                state.coalesced += 1;
                ThrottleOutcome::Coalesced
            }
            None => ThrottleOutcome::Scheduled,
        };
        state.pending = Some(self.schedule(event_type, callback));
        outcome
    }

    fn schedule(&self, event_type: &str, callback: DeferredCall) -> Pending {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let delay = self.inner.config.delay_for(event_type);

        let inner = Arc::clone(&self.inner);
        let key = event_type.to_string();
        let cancelled = token.clone();
        let sleep = inner.scheduler.sleep(delay);
        self.inner.scheduler.spawn(Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => return,
                _ = sleep => {}
            }
            inner.fire(&key, id).await;
        }));

        Pending {
            id,
            token,
            callback,
        }
    }
}

impl Inner {
    async fn fire(&self, event_type: &str, id: u64) {
        let _lane = self.lane.enter().await;
        let callback = {
            let now = self.scheduler.now();
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(event_type) else {
                return;
            };
            if !state.pending.as_ref().is_some_and(|pending| pending.id == id) {
                return;
            }
            state.fired += 1;
            state.last_fired_at = Some(now);
            state.pending.take().map(|pending| pending.callback)
        };

        if let Some(callback) = callback {
            if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(callback)) {
                warn!(
                    event_type,
                    panic = %panic_message(payload.as_ref()),
                    "Throttled callback panicked"
                );
            }
        }
    }
}

impl fmt::Debug for ThrottleGovernor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleGovernor")
            .field("types", &self.inner.states.lock().len())
            .finish_non_exhaustive()
    }
}
