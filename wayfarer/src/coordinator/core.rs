//! Bounded registry of timers, subscriptions and queued events.

use super::config::CoordinatorConfig;
use super::error::{CallbackResult, CoordinatorError, ResourceKind};
use super::handle::{FinishedFlag, ResourceHandle};
use super::health::{CoordinatorCounters, CoordinatorStats, HealthSnapshot};
use super::queue::{EventQueue, PriorityEvent};
use super::subscription::SubscriptionHandlers;
use crate::scheduler::{ExecutionLane, SharedScheduler};
use futures::{FutureExt, Stream, StreamExt};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Shortest period a periodic timer may use.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// How a callback invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Once(Duration),
    Every(Duration),
    Stream,
}

struct Entry {
    id: u64,
    schedule: Schedule,
    token: CancellationToken,
    finished: Arc<AtomicBool>,
    registered_at: Instant,
}

impl Entry {
    fn is_live(&self) -> bool {
        !self.token.is_cancelled() && !self.finished.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct Registry {
    timers: HashMap<String, Entry>,
    subscriptions: HashMap<String, Entry>,
    queue: EventQueue,
    draining: bool,
    generation: u64,
}

impl Registry {
    fn entries(&self, kind: ResourceKind) -> &HashMap<String, Entry> {
        match kind {
            ResourceKind::Timer => &self.timers,
            ResourceKind::Subscription => &self.subscriptions,
        }
    }

    fn entries_mut(&mut self, kind: ResourceKind) -> &mut HashMap<String, Entry> {
        match kind {
            ResourceKind::Timer => &mut self.timers,
            ResourceKind::Subscription => &mut self.subscriptions,
        }
    }
}

struct Admitted {
    id: u64,
    token: CancellationToken,
    finished: Arc<AtomicBool>,
}

struct Shared {
    config: CoordinatorConfig,
    scheduler: SharedScheduler,
    lane: ExecutionLane,
    registry: Mutex<Registry>,
    counters: CoordinatorCounters,
    next_id: AtomicU64,
}

/// Owns every recurring timer, stream subscription and deferred event.
///
/// The coordinator enforces fixed caps so runaway registration cannot
/// exhaust the process, and isolates callback failures: an error or panic
/// in one callback is logged and removes that one registration, nothing
/// else.
///
/// Keys are unique per registry. Registering an existing key cancels the
/// previous entry and replaces it, even when the registry is full.
///
/// Cloning is cheap and shares the same registry.
#[derive(Clone)]
pub struct ResourceCoordinator {
    shared: Arc<Shared>,
}

impl ResourceCoordinator {
    pub fn new(config: CoordinatorConfig, scheduler: SharedScheduler) -> Self {
        Self::with_lane(config, scheduler, ExecutionLane::new())
    }

    /// Create a coordinator whose callbacks run on an existing lane.
    pub fn with_lane(
        config: CoordinatorConfig,
        scheduler: SharedScheduler,
        lane: ExecutionLane,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                scheduler,
                lane,
                registry: Mutex::new(Registry::default()),
                counters: CoordinatorCounters::default(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    pub fn lane(&self) -> &ExecutionLane {
        &self.shared.lane
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.shared.scheduler
    }

    /// Run `callback` once after `delay`.
    ///
    /// The entry is removed after the callback runs, whatever its outcome.
    pub fn register_timer<F, Fut>(
        &self,
        key: impl Into<String>,
        delay: Duration,
        callback: F,
    ) -> Result<ResourceHandle, CoordinatorError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        let key = key.into();
        let admitted = self
            .shared
            .admit(ResourceKind::Timer, &key, Schedule::Once(delay))?;
        let handle = ResourceHandle::new(
            key.clone(),
            ResourceKind::Timer,
            admitted.token.clone(),
            Arc::clone(&admitted.finished),
        );

        let shared = Arc::clone(&self.shared);
        let Admitted {
            id,
            token,
            finished,
        } = admitted;
        let task = async move {
            let _finished = FinishedFlag(finished);
            let elapsed = tokio::select! {
                biased;
                _ = token.cancelled() => false,
                _ = shared.scheduler.sleep(delay) => true,
            };
            if elapsed {
                let outcome = shared
                    .run_async(ResourceKind::Timer.as_str(), &key, Some(&token), callback)
                    .await;
                if outcome != Outcome::Cancelled {
                    shared.counters.timer_fired();
                }
            }
            shared.remove_if_current(ResourceKind::Timer, &key, id);
        };
        self.shared.scheduler.spawn(Box::pin(task));

        Ok(handle)
    }

    /// Run `callback` every `interval` until cancelled.
    ///
    /// A failing tick cancels and removes the timer.
    pub fn register_periodic_timer<F, Fut>(
        &self,
        key: impl Into<String>,
        interval: Duration,
        mut callback: F,
    ) -> Result<ResourceHandle, CoordinatorError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        let key = key.into();
        let interval = interval.max(MIN_PERIOD);
        let admitted = self
            .shared
            .admit(ResourceKind::Timer, &key, Schedule::Every(interval))?;
        let handle = ResourceHandle::new(
            key.clone(),
            ResourceKind::Timer,
            admitted.token.clone(),
            Arc::clone(&admitted.finished),
        );

        let shared = Arc::clone(&self.shared);
        let Admitted {
            id,
            token,
            finished,
        } = admitted;
        let task = async move {
            let _finished = FinishedFlag(finished);
            loop {
                let elapsed = tokio::select! {
                    biased;
                    _ = token.cancelled() => false,
                    _ = shared.scheduler.sleep(interval) => true,
                };
                if !elapsed {
                    break;
                }
                let outcome = shared
                    .run_async(
                        ResourceKind::Timer.as_str(),
                        &key,
                        Some(&token),
                        &mut callback,
                    )
                    .await;
                match outcome {
                    Outcome::Completed => shared.counters.timer_fired(),
                    Outcome::Failed => {
                        shared.counters.timer_fired();
                        shared.remove_if_current(ResourceKind::Timer, &key, id);
                        break;
                    }
                    Outcome::Cancelled => break,
                }
            }
        };
        self.shared.scheduler.spawn(Box::pin(task));

        Ok(handle)
    }

    /// Bind `source` to `handlers` until the stream ends or is cancelled.
    ///
    /// A failing `on_data` skips that one item. The binding is removed when
    /// the stream completes, after `on_done` runs.
    pub fn register_subscription<S, T, E>(
        &self,
        key: impl Into<String>,
        source: S,
        handlers: SubscriptionHandlers<T, E>,
    ) -> Result<ResourceHandle, CoordinatorError>
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let key = key.into();
        let admitted = self
            .shared
            .admit(ResourceKind::Subscription, &key, Schedule::Stream)?;
        let handle = ResourceHandle::new(
            key.clone(),
            ResourceKind::Subscription,
            admitted.token.clone(),
            Arc::clone(&admitted.finished),
        );

        let shared = Arc::clone(&self.shared);
        let Admitted {
            id,
            token,
            finished,
        } = admitted;
        let task = async move {
            let _finished = FinishedFlag(finished);
            let SubscriptionHandlers {
                mut on_data,
                mut on_error,
                on_done,
            } = handlers;
            let origin = ResourceKind::Subscription.as_str();
            let mut source = Box::pin(source);

            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = source.next() => next,
                };
                let outcome = match next {
                    Some(Ok(item)) => {
                        shared
                            .run_sync(origin, &key, Some(&token), || on_data(item))
                            .await
                    }
                    Some(Err(error)) => match on_error.as_mut() {
                        Some(handler) => {
                            shared
                                .run_sync(origin, &key, Some(&token), || {
                                    handler(error);
                                    Ok(())
                                })
                                .await
                        }
                        None => {
                            warn!(key = %key, error = %error, "Subscription stream error");
                            Outcome::Completed
                        }
                    },
                    None => {
                        debug!(key = %key, "Subscription stream completed");
                        if let Some(on_done) = on_done {
                            shared
                                .run_sync(origin, &key, Some(&token), || {
                                    on_done();
                                    Ok(())
                                })
                                .await;
                        }
                        break;
                    }
                };
                if outcome == Outcome::Cancelled {
                    break;
                }
            }
            shared.remove_if_current(ResourceKind::Subscription, &key, id);
        };
        self.shared.scheduler.spawn(Box::pin(task));

        Ok(handle)
    }

    /// Cancel and remove a timer. Returns true if an active timer was removed.
    pub fn cancel_timer(&self, key: &str) -> bool {
        self.shared.cancel(ResourceKind::Timer, key)
    }

    /// Cancel and remove a subscription. Returns true if an active
    /// subscription was removed.
    pub fn cancel_subscription(&self, key: &str) -> bool {
        self.shared.cancel(ResourceKind::Subscription, key)
    }

    /// Cancel every timer and subscription whose key starts with `prefix`.
    ///
    /// Returns the number of registrations removed.
    pub fn cancel_by_prefix(&self, prefix: &str) -> usize {
        let removed: Vec<Entry> = {
            let mut registry = self.shared.registry.lock();
            let mut removed = Vec::new();
            for kind in [ResourceKind::Timer, ResourceKind::Subscription] {
                let entries = registry.entries_mut(kind);
                let keys: Vec<String> = entries
                    .keys()
                    .filter(|key| key.starts_with(prefix))
                    .cloned()
                    .collect();
                for key in keys {
                    if let Some(entry) = entries.remove(&key) {
                        removed.push(entry);
                    }
                }
            }
            removed
        };
        for entry in &removed {
            entry.token.cancel();
        }
        if !removed.is_empty() {
            debug!(prefix, count = removed.len(), "Cancelled registrations by prefix");
        }
        removed.len()
    }

    /// Defer `callback` to the priority queue.
    ///
    /// Higher priority runs first; equal priorities run in insertion order.
    /// When the queue is full the oldest event is evicted and counted as
    /// dropped. Queued events run one at a time, yielding between events.
    pub fn queue_event<F>(&self, event_type: impl Into<String>, priority: i32, callback: F)
    where
        F: FnOnce() -> CallbackResult + Send + 'static,
    {
        let event = PriorityEvent {
            event_type: event_type.into(),
            priority,
            enqueued_at: self.shared.scheduler.now(),
            callback: Box::new(callback),
        };

        let (evicted, start_drain) = {
            let mut registry = self.shared.registry.lock();
            let evicted = registry
                .queue
                .push_bounded(event, self.shared.config.max_queued_events);
            let start_drain = if registry.draining {
                None
            } else {
                registry.draining = true;
                Some(registry.generation)
            };
            (evicted, start_drain)
        };

        for dropped in evicted {
            self.shared.counters.event_dropped();
            warn!(
                event_type = %dropped.event_type,
                priority = dropped.priority,
                cap = self.shared.config.max_queued_events,
                "Event queue full, dropped oldest event"
            );
        }

        if let Some(generation) = start_drain {
            let shared = Arc::clone(&self.shared);
            self.shared
                .scheduler
                .spawn(Box::pin(shared.drain_queue(generation)));
        }
    }

    /// Current load against the configured caps.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        let registry = self.shared.registry.lock();
        let config = &self.shared.config;
        let active_timers = registry.timers.len();
        let active_subscriptions = registry.subscriptions.len();
        let queued_events = registry.queue.len();
        HealthSnapshot {
            active_timers,
            active_subscriptions,
            queued_events,
            is_healthy: active_timers < config.max_timers
                && active_subscriptions < config.max_subscriptions
                && queued_events < config.max_queued_events,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health_snapshot().is_healthy
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.shared.counters.stats(self.health_snapshot())
    }

    pub fn has_timer(&self, key: &str) -> bool {
        self.shared.contains(ResourceKind::Timer, key)
    }

    pub fn has_subscription(&self, key: &str) -> bool {
        self.shared.contains(ResourceKind::Subscription, key)
    }

    /// Registered timer keys, sorted.
    pub fn timer_keys(&self) -> Vec<String> {
        self.shared.keys(ResourceKind::Timer)
    }

    /// Registered subscription keys, sorted.
    pub fn subscription_keys(&self) -> Vec<String> {
        self.shared.keys(ResourceKind::Subscription)
    }

    /// Remove entries whose task was cancelled or has finished.
    ///
    /// Returns the number of entries swept.
    pub fn cleanup(&self) -> usize {
        let swept: Vec<(ResourceKind, String, Schedule, Duration)> = {
            let mut registry = self.shared.registry.lock();
            let now = self.shared.scheduler.now();
            let mut swept = Vec::new();
            for kind in [ResourceKind::Timer, ResourceKind::Subscription] {
                registry.entries_mut(kind).retain(|key, entry| {
                    let live = entry.is_live();
                    if !live {
                        swept.push((kind, key.clone(), entry.schedule, now - entry.registered_at));
                    }
                    live
                });
            }
            swept
        };

        for (kind, key, schedule, age) in &swept {
            debug!(
                kind = %kind,
                key = %key,
                schedule = ?schedule,
                age_ms = age.as_millis() as u64,
                "Swept inactive registration"
            );
        }
        if !swept.is_empty() {
            info!(count = swept.len(), "Coordinator cleanup removed inactive registrations");
        }
        swept.len()
    }

    /// Cancel everything and clear all registries and the queue.
    ///
    /// Idempotent. The coordinator stays usable: later registrations are
    /// accepted as usual.
    pub fn shutdown(&self) {
        let (timers, subscriptions, queued) = {
            let mut registry = self.shared.registry.lock();
            registry.generation = registry.generation.wrapping_add(1);
            registry.draining = false;
            let queued = registry.queue.clear();
            (
                std::mem::take(&mut registry.timers),
                std::mem::take(&mut registry.subscriptions),
                queued,
            )
        };

        for entry in timers.values().chain(subscriptions.values()) {
            entry.token.cancel();
        }

        if timers.is_empty() && subscriptions.is_empty() && queued == 0 {
            debug!("Coordinator shutdown with nothing registered");
        } else {
            info!(
                timers = timers.len(),
                subscriptions = subscriptions.len(),
                queued_events = queued,
                "Coordinator shut down"
            );
        }
    }

    /// Release spare registry capacity.
    pub fn reclaim_memory(&self) {
        let mut registry = self.shared.registry.lock();
        registry.timers.shrink_to_fit();
        registry.subscriptions.shrink_to_fit();
        registry.queue.shrink_to_fit();
        trace!("Coordinator registries compacted");
    }
}

impl fmt::Debug for ResourceCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCoordinator")
            .field("config", &self.shared.config)
            .field("health", &self.health_snapshot())
            .finish()
    }
}

impl Shared {
    fn admit(
        &self,
        kind: ResourceKind,
        key: &str,
        schedule: Schedule,
    ) -> Result<Admitted, CoordinatorError> {
        let cap = match kind {
            ResourceKind::Timer => self.config.max_timers,
            ResourceKind::Subscription => self.config.max_subscriptions,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));

        let replaced = {
            let mut registry = self.registry.lock();
            let entries = registry.entries_mut(kind);
            let active = entries.len();
            if !entries.contains_key(key) && active >= cap {
                Err(CoordinatorError::ResourceExhausted {
                    kind,
                    key: key.to_string(),
                    active,
                    cap,
                })
            } else {
                Ok(entries.insert(
                    key.to_string(),
                    Entry {
                        id,
                        schedule,
                        token: token.clone(),
                        finished: Arc::clone(&finished),
                        registered_at: self.scheduler.now(),
                    },
                ))
            }
        };

        match replaced {
            Err(error) => {
                self.counters.registration_rejected();
                warn!(kind = %kind, key, cap, "Registration rejected: {}", error);
                Err(error)
            }
            Ok(previous) => {
                if let Some(previous) = previous {
                    previous.token.cancel();
                    debug!(kind = %kind, key, "Replaced existing registration");
                }
                trace!(kind = %kind, key, schedule = ?schedule, "Registered");
                Ok(Admitted {
                    id,
                    token,
                    finished,
                })
            }
        }
    }

    fn cancel(&self, kind: ResourceKind, key: &str) -> bool {
        let removed = self.registry.lock().entries_mut(kind).remove(key);
        match removed {
            Some(entry) => {
                let was_live = entry.is_live();
                entry.token.cancel();
                debug!(kind = %kind, key, "Cancelled registration");
                was_live
            }
            None => false,
        }
    }

    /// Remove `key` only if it still refers to registration `id`.
    fn remove_if_current(&self, kind: ResourceKind, key: &str, id: u64) {
        let mut registry = self.registry.lock();
        let entries = registry.entries_mut(kind);
        if entries.get(key).is_some_and(|entry| entry.id == id) {
            if let Some(entry) = entries.remove(key) {
                entry.token.cancel();
            }
        }
    }

    fn contains(&self, kind: ResourceKind, key: &str) -> bool {
        self.registry.lock().entries(kind).contains_key(key)
    }

    fn keys(&self, kind: ResourceKind) -> Vec<String> {
        let mut keys: Vec<String> = self.registry.lock().entries(kind).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Run an async callback on the lane with panic isolation.
    async fn run_async<F, Fut>(
        &self,
        origin: &'static str,
        key: &str,
        token: Option<&CancellationToken>,
        invoke: F,
    ) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CallbackResult>,
    {
        let _lane = self.lane.enter().await;
        if token.is_some_and(|token| token.is_cancelled()) {
            return Outcome::Cancelled;
        }
        let result = AssertUnwindSafe(async move { invoke().await })
            .catch_unwind()
            .await;
        self.settle(origin, key, result)
    }

    /// Run a synchronous callback on the lane with panic isolation.
    async fn run_sync<F>(
        &self,
        origin: &'static str,
        key: &str,
        token: Option<&CancellationToken>,
        invoke: F,
    ) -> Outcome
    where
        F: FnOnce() -> CallbackResult,
    {
        let _lane = self.lane.enter().await;
        if token.is_some_and(|token| token.is_cancelled()) {
            return Outcome::Cancelled;
        }
        let result = std::panic::catch_unwind(AssertUnwindSafe(invoke));
        self.settle(origin, key, result)
    }

    fn settle(
        &self,
        origin: &'static str,
        key: &str,
        result: Result<CallbackResult, Box<dyn Any + Send>>,
    ) -> Outcome {
        match result {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(error)) => {
                self.counters.callback_failed();
                warn!(origin, key, error = %error, "Callback failed");
                Outcome::Failed
            }
            Err(payload) => {
                self.counters.callback_failed();
                warn!(origin, key, panic = %panic_message(payload.as_ref()), "Callback panicked");
                Outcome::Failed
            }
        }
    }

    async fn drain_queue(self: Arc<Self>, generation: u64) {
        loop {
            let next = {
                let mut registry = self.registry.lock();
                if registry.generation != generation {
                    return;
                }
                match registry.queue.pop_highest() {
                    Some(event) => event,
                    None => {
                        registry.draining = false;
                        return;
                    }
                }
            };

            let PriorityEvent {
                event_type,
                priority,
                enqueued_at,
                callback,
            } = next;
            trace!(
                event_type = %event_type,
                priority,
                waited_ms = (self.scheduler.now() - enqueued_at).as_millis() as u64,
                "Running queued event"
            );
            self.run_sync("event", &event_type, None, callback).await;
            self.counters.event_processed();

            tokio::task::yield_now().await;
        }
    }
}

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
