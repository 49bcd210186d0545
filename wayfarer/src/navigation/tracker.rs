//! Active navigation tracking.

use super::config::NavigationConfig;
use super::error::TrackerError;
use super::source::{PositionSample, PositionSource};
use super::state::{NavigationPhase, NavigationSession, PositionOutcome, ProgressEvent, SavedSession};
use super::store::KeyValueStore;
use crate::coordinator::{CoordinatorError, ResourceCoordinator, SubscriptionHandlers};
use crate::geo::Coordinate;
use crate::recovery::{RecoveryError, RecoveryHook};
use crate::throttle::{kinds, ThrottleGovernor};
use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "navigation";

struct TrackerState {
    phase: NavigationPhase,
    session: Option<NavigationSession>,
    sender: Option<broadcast::Sender<ProgressEvent>>,
    last_progress: Option<ProgressEvent>,
}

struct Inner {
    config: NavigationConfig,
    coordinator: ResourceCoordinator,
    governor: ThrottleGovernor,
    source: Option<Arc<dyn PositionSource>>,
    store: Option<Arc<dyn KeyValueStore>>,
    state: Mutex<TrackerState>,
    next_session_id: AtomicU64,
}

/// Builder for [`NavigationTracker`].
pub struct NavigationTrackerBuilder {
    config: NavigationConfig,
    coordinator: ResourceCoordinator,
    governor: ThrottleGovernor,
    source: Option<Arc<dyn PositionSource>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl NavigationTrackerBuilder {
    /// Poll (and, if it pushes, subscribe to) this source while active.
    pub fn source(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Persist sessions to this store.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> NavigationTracker {
        NavigationTracker {
            inner: Arc::new(Inner {
                config: self.config,
                coordinator: self.coordinator,
                governor: self.governor,
                source: self.source,
                store: self.store,
                state: Mutex::new(TrackerState {
                    phase: NavigationPhase::Idle,
                    session: None,
                    sender: None,
                    last_progress: None,
                }),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }
}

/// Tracks progress along a route and broadcasts it to observers.
///
/// Fixes arrive from the periodic sampling task, from a pushed position
/// stream, or directly through [`handle_position`](Self::handle_position).
/// Each accepted fix updates speed, remaining distance and route index;
/// reaching the arrival radius emits a final 100% event and ends the
/// session.
///
/// Progress observers subscribe through [`subscribe`](Self::subscribe) and
/// never block the tracker: slow receivers lag and skip events.
#[derive(Clone)]
pub struct NavigationTracker {
    inner: Arc<Inner>,
}

impl NavigationTracker {
    pub fn builder(
        config: NavigationConfig,
        coordinator: ResourceCoordinator,
        governor: ThrottleGovernor,
    ) -> NavigationTrackerBuilder {
        NavigationTrackerBuilder {
            config,
            coordinator,
            governor,
            source: None,
            store: None,
        }
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.inner.config
    }

    pub fn phase(&self) -> NavigationPhase {
        self.inner.state.lock().phase
    }

    /// Copy of the active session, if any.
    pub fn session(&self) -> Option<NavigationSession> {
        self.inner.state.lock().session.clone()
    }

    /// Most recent progress computed, including the final arrival event.
    pub fn last_progress(&self) -> Option<ProgressEvent> {
        self.inner.state.lock().last_progress.clone()
    }

    /// Observe progress events of the active session.
    ///
    /// Returns `None` when no session is active. The receiver sees the
    /// channel close when the session ends.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.inner
            .state
            .lock()
            .sender
            .as_ref()
            .map(broadcast::Sender::subscribe)
    }

    /// Begin a new session, replacing any active one.
    ///
    /// Failing to register the background tasks is logged and does not
    /// fail the call; fixes can still be fed through `handle_position`.
    pub fn start_navigation(
        &self,
        destination: Coordinate,
        route: Vec<Coordinate>,
        total_distance_m: f64,
    ) -> Result<(), TrackerError> {
        if !destination.is_valid() {
            return Err(TrackerError::InvalidDestination(destination));
        }
        if !total_distance_m.is_finite() || total_distance_m < 0.0 {
            return Err(TrackerError::InvalidDistance(total_distance_m));
        }
        if let Some(index) = route.iter().position(|point| !point.is_valid()) {
            return Err(TrackerError::InvalidRoute(index));
        }

        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = NavigationSession::new(id, destination, route, total_distance_m, Utc::now());
        self.activate(session);
        info!(
            session = id,
            destination = %destination,
            total_m = total_distance_m,
            "Navigation started"
        );
        self.save_state();
        Ok(())
    }

    /// End the active session. Returns false if nothing was active.
    pub fn stop_navigation(&self) -> bool {
        let ended = self.finish(NavigationPhase::Stopped);
        if let Some(id) = ended {
            info!(session = id, "Navigation stopped");
            self.clear_saved_state();
        }
        ended.is_some()
    }

    /// Fold one position fix into the active session.
    ///
    /// Invalid coordinates are discarded without touching the session.
    pub fn handle_position(&self, sample: PositionSample) -> PositionOutcome {
        if !sample.coordinate.is_valid() {
            debug!(position = %sample.coordinate, "Discarding invalid position");
            return PositionOutcome::Rejected;
        }

        let (session_id, event, arrived) = {
            let mut state = self.inner.state.lock();
            if state.phase != NavigationPhase::Active {
                return PositionOutcome::Inactive;
            }
            let Some(session) = state.session.as_mut() else {
                return PositionOutcome::Inactive;
            };

            let to_destination = session.apply_sample(&sample, &self.inner.config);
            let arrived = to_destination <= self.inner.config.arrival_radius_m;
            let event = if arrived {
                session.arrival()
            } else {
                session.progress()
            };
            let session_id = session.id;
            state.last_progress = Some(event.clone());

            if arrived {
                if let Some(sender) = state.sender.as_ref() {
                    let _ = sender.send(event.clone());
                }
            }
            (session_id, event, arrived)
        };

        if arrived {
            info!(session = session_id, "Destination reached");
            self.finish(NavigationPhase::Arrived);
            self.clear_saved_state();
            return PositionOutcome::Arrived(event);
        }

        self.broadcast_throttled(session_id);
        if self.inner.config.autosave {
            self.save_state();
        }
        PositionOutcome::Updated(event)
    }

    /// Persist the active session. Returns true on success.
    ///
    /// Store failures are logged, never propagated.
    pub fn save_state(&self) -> bool {
        let Some(store) = self.inner.store.as_ref() else {
            return false;
        };
        let saved = {
            let state = self.inner.state.lock();
            match state.session.as_ref() {
                Some(session) => session.to_saved(Utc::now()),
                None => return false,
            }
        };

        let bytes = match serde_json::to_vec(&saved) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize navigation session");
                return false;
            }
        };
        match store.set(&self.inner.config.state_key, &bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save navigation session");
                false
            }
        }
    }

    /// Resume a saved session. Returns true if one was restored.
    ///
    /// Sessions older than `restore_max_age` are discarded.
    pub fn restore_state(&self) -> bool {
        let Some(store) = self.inner.store.as_ref() else {
            return false;
        };
        let key = &self.inner.config.state_key;
        let bytes = match store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Failed to read saved navigation session");
                return false;
            }
        };
        let saved: SavedSession = match serde_json::from_slice(&bytes) {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable navigation session");
                self.clear_saved_state();
                return false;
            }
        };

        let age = (Utc::now() - saved.saved_at).to_std().unwrap_or_default();
        if age > self.inner.config.restore_max_age {
            info!(age_secs = age.as_secs(), "Discarding stale navigation session");
            self.clear_saved_state();
            return false;
        }
        if !saved.destination.is_valid() {
            warn!(destination = %saved.destination, "Discarding saved session with invalid destination");
            self.clear_saved_state();
            return false;
        }

        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = NavigationSession::from_saved(id, saved);
        let remaining = session.remaining_distance_m;
        self.activate(session);
        info!(session = id, remaining_m = remaining, "Navigation session restored");
        true
    }

    fn activate(&self, session: NavigationSession) {
        let id = session.id;
        let previous = {
            let mut state = self.inner.state.lock();
            let previous = state.session.as_ref().map(|s| s.id);
            let (sender, _) = broadcast::channel(self.inner.config.channel_capacity.max(1));
            state.last_progress = Some(session.progress());
            state.session = Some(session);
            state.sender = Some(sender);
            state.phase = NavigationPhase::Active;
            previous
        };
        if let Some(previous) = previous {
            self.inner.coordinator.cancel_by_prefix(&session_prefix(previous));
            debug!(previous, "Replaced active navigation session");
        }
        if let Err(e) = self.arm_tasks(id) {
            warn!(session = id, error = %e, "Navigation running without background tasks");
        }
    }

    /// Tear down the active session, entering `phase`. Returns its id.
    fn finish(&self, phase: NavigationPhase) -> Option<u64> {
        let id = {
            let mut state = self.inner.state.lock();
            let id = state.session.take().map(|s| s.id)?;
            // Dropping the sender closes every observer's channel.
            state.sender = None;
            state.phase = phase;
            id
        };
        self.inner.coordinator.cancel_by_prefix(&session_prefix(id));
        Some(id)
    }

    fn clear_saved_state(&self) {
        if let Some(store) = self.inner.store.as_ref() {
            if let Err(e) = store.remove(&self.inner.config.state_key) {
                warn!(error = %e, "Failed to remove saved navigation session");
            }
        }
    }

    /// Register sampling, broadcast and (if available) stream tasks.
    fn arm_tasks(&self, id: u64) -> Result<(), CoordinatorError> {
        let coordinator = &self.inner.coordinator;
        let prefix = session_prefix(id);

        let weak = Arc::downgrade(&self.inner);
        coordinator.register_periodic_timer(
            format!("{prefix}position_sampling"),
            self.inner.config.sampling_interval,
            move || {
                let tracker = upgrade(&weak);
                async move {
                    if let Some(tracker) = tracker {
                        tracker.sample_position().await;
                    }
                    Ok(())
                }
            },
        )?;

        let weak = Arc::downgrade(&self.inner);
        coordinator.register_periodic_timer(
            format!("{prefix}progress_broadcast"),
            self.inner.config.broadcast_interval,
            move || {
                if let Some(tracker) = upgrade(&weak) {
                    tracker.broadcast_throttled(id);
                }
                async { Ok(()) }
            },
        )?;

        if let Some(stream) = self.inner.source.as_ref().and_then(|source| source.watch()) {
            let weak = Arc::downgrade(&self.inner);
            coordinator.register_subscription(
                format!("{prefix}position_stream"),
                stream,
                SubscriptionHandlers::new(move |sample: PositionSample| {
                    if let Some(tracker) = upgrade(&weak) {
                        tracker.handle_position(sample);
                    }
                    Ok(())
                })
                .with_on_error(|e| debug!(error = %e, "Position stream error")),
            )?;
        }

        debug!(session = id, "Navigation tasks armed");
        Ok(())
    }

    async fn sample_position(&self) {
        let Some(source) = self.inner.source.as_ref() else {
            return;
        };
        match source.current_position().await {
            Ok(sample) => {
                self.handle_position(sample);
            }
            Err(e) => debug!(error = %e, "Position sample unavailable"),
        }
    }

    /// Send the current progress through the governor.
    ///
    /// The deferred send re-reads the session at fire time, so a burst of
    /// updates delivers only the latest state and nothing is sent after the
    /// session ends.
    fn broadcast_throttled(&self, session_id: u64) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.governor.throttle(kinds::NAVIGATION_PROGRESS, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let state = inner.state.lock();
            let current = state.session.as_ref().filter(|s| s.id == session_id);
            if let (Some(session), Some(sender)) = (current, state.sender.as_ref()) {
                let _ = sender.send(session.progress());
            }
        });
    }
}

fn session_prefix(id: u64) -> String {
    format!("{KEY_PREFIX}.{id}.")
}

fn upgrade(weak: &Weak<Inner>) -> Option<NavigationTracker> {
    weak.upgrade().map(|inner| NavigationTracker { inner })
}

impl RecoveryHook for NavigationTracker {
    fn name(&self) -> &str {
        "navigation"
    }

    /// Re-register the active session's tasks after the coordinator was reset.
    fn on_recovered(&self) -> Result<(), RecoveryError> {
        let active = {
            let state = self.inner.state.lock();
            state
                .session
                .as_ref()
                .filter(|_| state.phase == NavigationPhase::Active)
                .map(|s| s.id)
        };
        let Some(id) = active else {
            return Ok(());
        };
        self.arm_tasks(id).map_err(|source| RecoveryError::Registration {
            key: session_prefix(id),
            source,
        })
    }
}

impl fmt::Debug for NavigationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("NavigationTracker")
            .field("phase", &state.phase)
            .field("session", &state.session.as_ref().map(|s| s.id))
            .finish_non_exhaustive()
    }
}
