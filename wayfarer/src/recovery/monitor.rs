//! Centralized failure counting and emergency recovery.

use super::config::RecoveryConfig;
use super::error::RecoveryError;
use super::hook::RecoveryHook;
use crate::circuit::{CircuitPhase, CircuitRegistry};
use crate::coordinator::ResourceCoordinator;
use crate::scheduler::SharedScheduler;
use crate::throttle::ThrottleGovernor;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Coordinator key of the periodic health check.
pub const HEALTH_CHECK_KEY: &str = "recovery.health_check";

/// Coordinator key of the periodic cleanup sweep.
pub const CLEANUP_KEY: &str = "recovery.cleanup";

const KEY_PREFIX: &str = "recovery.";

/// Attempts per emergency recovery before giving up.
const MAX_RECOVERY_ATTEMPTS: u32 = 2;

/// Lifecycle of the recovery monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    /// Not monitoring.
    Idle,
    /// Periodic checks registered.
    Monitoring,
    /// Emergency recovery in progress.
    Recovering,
    /// Recovery failed twice; services run uncoordinated and no further
    /// recovery is attempted.
    Degraded,
}

impl RecoveryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryPhase::Idle => "idle",
            RecoveryPhase::Monitoring => "monitoring",
            RecoveryPhase::Recovering => "recovering",
            RecoveryPhase::Degraded => "degraded",
        }
    }
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the monitor for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    pub phase: RecoveryPhase,
    pub overload_count: u32,
    pub consecutive_errors: u32,
    pub health_checks: u64,
    pub recoveries_started: u64,
    pub recoveries_succeeded: u64,
    pub recovery_failures: u64,
    pub since_last_recovery: Option<Duration>,
}

/// Handle through which components feed failures to a [`RecoveryMonitor`].
///
/// Components are built before the monitor that watches them, so a reporter
/// starts detached and is bound by [`RecoveryMonitor::new`]. It holds only a
/// weak reference; reports while detached are ignored.
#[derive(Clone, Default)]
pub struct FailureReporter {
    target: Arc<Mutex<Weak<Inner>>>,
}

impl FailureReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.target.lock().strong_count() > 0
    }

    /// Forward a failure to [`RecoveryMonitor::report_error`].
    pub fn report_error(&self, context: &str, error: &dyn fmt::Display) {
        if let Some(monitor) = self.monitor() {
            monitor.report_error(context, error);
        }
    }

    /// Forward an overload to [`RecoveryMonitor::report_event_overload`].
    pub fn report_event_overload(&self) {
        if let Some(monitor) = self.monitor() {
            monitor.report_event_overload();
        }
    }

    fn monitor(&self) -> Option<RecoveryMonitor> {
        let weak = self.target.lock().clone();
        upgrade(&weak)
    }
}

impl fmt::Debug for FailureReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureReporter")
            .field("attached", &self.is_attached())
            .finish()
    }
}

struct Inner {
    config: RecoveryConfig,
    coordinator: ResourceCoordinator,
    governor: ThrottleGovernor,
    circuits: CircuitRegistry,
    scheduler: SharedScheduler,
    hooks: Mutex<Vec<Arc<dyn RecoveryHook>>>,
    phase: Mutex<RecoveryPhase>,
    recovering: AtomicBool,
    overloads: AtomicU32,
    consecutive_errors: AtomicU32,
    health_checks: AtomicU64,
    recoveries_started: AtomicU64,
    recoveries_succeeded: AtomicU64,
    recovery_failures: AtomicU64,
    last_recovery_at: Mutex<Option<Instant>>,
}

/// Watches coordinator, throttle and circuit state and resets the system
/// when local failures pile up.
///
/// Unrelated failures (a bad network response, an overloaded event type, a
/// saturated registry) all feed the same two counters so that one decision
/// is made centrally instead of each component degrading on its own. The
/// governor and the circuit registry report through their
/// [`FailureReporter`], which the monitor binds on construction.
///
/// ```text
/// Idle --start_recovery--> Monitoring --threshold--> Recovering --ok--> Monitoring
///                                                       |
///                                                  failed twice
///                                                       v
///                                                   Degraded
/// ```
#[derive(Clone)]
pub struct RecoveryMonitor {
    inner: Arc<Inner>,
}

impl RecoveryMonitor {
    pub fn new(
        config: RecoveryConfig,
        coordinator: ResourceCoordinator,
        governor: ThrottleGovernor,
        circuits: CircuitRegistry,
    ) -> Self {
        let scheduler = Arc::clone(coordinator.scheduler());
        let monitor = Self {
            inner: Arc::new(Inner {
                config,
                coordinator,
                governor,
                circuits,
                scheduler,
                hooks: Mutex::new(Vec::new()),
                phase: Mutex::new(RecoveryPhase::Idle),
                recovering: AtomicBool::new(false),
                overloads: AtomicU32::new(0),
                consecutive_errors: AtomicU32::new(0),
                health_checks: AtomicU64::new(0),
                recoveries_started: AtomicU64::new(0),
                recoveries_succeeded: AtomicU64::new(0),
                recovery_failures: AtomicU64::new(0),
                last_recovery_at: Mutex::new(None),
            }),
        };
        monitor.attach(monitor.inner.governor.failure_reporter());
        monitor.attach(monitor.inner.circuits.failure_reporter());
        monitor
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.inner.config
    }

    pub fn circuits(&self) -> &CircuitRegistry {
        &self.inner.circuits
    }

    /// Bind `reporter` to this monitor, replacing any previous binding.
    pub fn attach(&self, reporter: &FailureReporter) {
        *reporter.target.lock() = Arc::downgrade(&self.inner);
    }

    pub fn phase(&self) -> RecoveryPhase {
        *self.inner.phase.lock()
    }

    pub fn is_recovering(&self) -> bool {
        self.inner.recovering.load(Ordering::Acquire)
    }

    /// Add a component to re-arm after each emergency recovery.
    pub fn add_hook(&self, hook: Arc<dyn RecoveryHook>) {
        debug!(hook = hook.name(), "Recovery hook added");
        self.inner.hooks.lock().push(hook);
    }

    /// Register the periodic health check and cleanup sweep.
    pub fn start_recovery(&self) -> Result<(), RecoveryError> {
        self.register_checks()?;
        *self.inner.phase.lock() = RecoveryPhase::Monitoring;
        info!(
            health_check_secs = self.inner.config.health_check_interval.as_secs(),
            cleanup_secs = self.inner.config.cleanup_interval.as_secs(),
            "Recovery monitoring started"
        );
        Ok(())
    }

    /// Cancel the monitor's timers and return to idle.
    pub fn stop(&self) {
        let cancelled = self.inner.coordinator.cancel_by_prefix(KEY_PREFIX);
        *self.inner.phase.lock() = RecoveryPhase::Idle;
        debug!(cancelled, "Recovery monitoring stopped");
    }

    /// Run one health check now.
    ///
    /// An unhealthy coordinator, any event type above the rate ceiling, or a
    /// circuit stuck open counts as one overload. An open circuit holds the
    /// counters where they are. Only a clean check clears them.
    pub fn check_health(&self) {
        if self.is_recovering() {
            return;
        }
        self.inner.health_checks.fetch_add(1, Ordering::Relaxed);

        let health = self.inner.coordinator.health_snapshot();
        let throttle = self.inner.governor.stats();
        let ceiling = self.inner.config.event_rate_ceiling;
        let hot_type = throttle
            .busiest()
            .filter(|(_, stats)| stats.events_in_window > ceiling);
        let circuits = self.inner.circuits.stats();
        let open_circuits = circuits
            .iter()
            .filter(|stats| stats.phase == CircuitPhase::Open)
            .count();
        let stuck_circuits = circuits.iter().filter(|stats| stats.stuck_open).count();

        let overloaded = !health.is_healthy || hot_type.is_some() || stuck_circuits > 0;
        if !overloaded && open_circuits > 0 {
            debug!(open_circuits, "Circuit open, holding recovery counters");
            return;
        }
        if !overloaded {
            self.inner.overloads.store(0, Ordering::Relaxed);
            self.inner.consecutive_errors.store(0, Ordering::Relaxed);
            debug!(
                timers = health.active_timers,
                subscriptions = health.active_subscriptions,
                queued = health.queued_events,
                "Health check passed"
            );
            return;
        }

        let overloads = self.inner.overloads.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            overloads,
            coordinator_healthy = health.is_healthy,
            timers = health.active_timers,
            subscriptions = health.active_subscriptions,
            queued = health.queued_events,
            hot_type = hot_type.map(|(kind, _)| kind).unwrap_or("-"),
            events_per_second = hot_type.map(|(_, stats)| stats.events_in_window).unwrap_or(0),
            stuck_circuits,
            "Overload detected"
        );
        self.evaluate();
    }

    /// Record a local failure from any component.
    pub fn report_error(&self, context: &str, error: &dyn fmt::Display) {
        let errors = self.inner.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(context, error = %error, consecutive_errors = errors, "Error reported to recovery monitor");
        self.evaluate();
    }

    /// Record an overload detected outside the periodic check.
    pub fn report_event_overload(&self) {
        let overloads = self.inner.overloads.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(overloads, "Event overload reported");
        self.evaluate();
    }

    pub fn stats(&self) -> RecoveryStats {
        let now = self.inner.scheduler.now();
        RecoveryStats {
            phase: self.phase(),
            overload_count: self.inner.overloads.load(Ordering::Relaxed),
            consecutive_errors: self.inner.consecutive_errors.load(Ordering::Relaxed),
            health_checks: self.inner.health_checks.load(Ordering::Relaxed),
            recoveries_started: self.inner.recoveries_started.load(Ordering::Relaxed),
            recoveries_succeeded: self.inner.recoveries_succeeded.load(Ordering::Relaxed),
            recovery_failures: self.inner.recovery_failures.load(Ordering::Relaxed),
            since_last_recovery: self
                .inner
                .last_recovery_at
                .lock()
                .map(|at| now.saturating_duration_since(at)),
        }
    }

    fn evaluate(&self) {
        let config = &self.inner.config;
        let overloads = self.inner.overloads.load(Ordering::Relaxed);
        let errors = self.inner.consecutive_errors.load(Ordering::Relaxed);

        if overloads >= config.max_event_overloads {
            self.trigger_emergency_recovery("event overloads");
        } else if errors >= config.max_consecutive_errors {
            self.trigger_emergency_recovery("consecutive errors");
        }
    }

    fn trigger_emergency_recovery(&self, reason: &'static str) {
        if self.phase() == RecoveryPhase::Degraded {
            debug!(reason, "Recovery threshold reached while degraded, ignoring");
            return;
        }
        if self.inner.recovering.swap(true, Ordering::AcqRel) {
            debug!(reason, "Emergency recovery already in progress");
            return;
        }

        *self.inner.phase.lock() = RecoveryPhase::Recovering;
        self.inner.recoveries_started.fetch_add(1, Ordering::Relaxed);
        warn!(
            reason,
            overloads = self.inner.overloads.load(Ordering::Relaxed),
            errors = self.inner.consecutive_errors.load(Ordering::Relaxed),
            "Emergency recovery triggered"
        );

        let monitor = self.clone();
        self.inner
            .scheduler
            .spawn(Box::pin(async move { monitor.run_recovery().await }));
    }

    async fn run_recovery(&self) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.recover_once().await {
                Ok(()) => {
                    self.inner.overloads.store(0, Ordering::Relaxed);
                    self.inner.consecutive_errors.store(0, Ordering::Relaxed);
                    self.inner.recoveries_succeeded.fetch_add(1, Ordering::Relaxed);
                    *self.inner.last_recovery_at.lock() = Some(self.inner.scheduler.now());
                    *self.inner.phase.lock() = RecoveryPhase::Monitoring;
                    info!(attempt, "Emergency recovery complete");
                    break;
                }
                Err(e) if attempt < MAX_RECOVERY_ATTEMPTS => {
                    self.inner.recovery_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        attempt,
                        error = %e,
                        retry_in_secs = self.inner.config.retry_delay.as_secs(),
                        "Emergency recovery failed, retrying"
                    );
                    self.inner.scheduler.sleep(self.inner.config.retry_delay).await;
                }
                Err(e) => {
                    self.inner.recovery_failures.fetch_add(1, Ordering::Relaxed);
                    *self.inner.phase.lock() = RecoveryPhase::Degraded;
                    error!(
                        attempt,
                        error = %e,
                        "Emergency recovery failed again, continuing in degraded mode"
                    );
                    break;
                }
            }
        }
        self.inner.recovering.store(false, Ordering::Release);
    }

    async fn recover_once(&self) -> Result<(), RecoveryError> {
        let inner = &self.inner;
        inner.coordinator.shutdown();
        inner.governor.clear();
        inner.coordinator.reclaim_memory();
        inner.governor.reclaim_memory();
        let reset = inner.circuits.reset_stuck();
        if reset > 0 {
            info!(circuits = reset, "Stuck circuits reset for a fresh trial");
        }

        inner.scheduler.sleep(inner.config.recovery_delay).await;

        self.register_checks()?;
        let hooks: Vec<Arc<dyn RecoveryHook>> = inner.hooks.lock().clone();
        for hook in hooks {
            hook.on_recovered()?;
            debug!(hook = hook.name(), "Component re-armed after recovery");
        }
        Ok(())
    }

    fn register_checks(&self) -> Result<(), RecoveryError> {
        let config = &self.inner.config;

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .coordinator
            .register_periodic_timer(HEALTH_CHECK_KEY, config.health_check_interval, move || {
                let monitor = upgrade(&weak);
                async move {
                    if let Some(monitor) = monitor {
                        monitor.check_health();
                    }
                    Ok(())
                }
            })
            .map_err(|source| RecoveryError::Registration {
                key: HEALTH_CHECK_KEY.to_string(),
                source,
            })?;

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .coordinator
            .register_periodic_timer(CLEANUP_KEY, config.cleanup_interval, move || {
                let monitor = upgrade(&weak);
                async move {
                    if let Some(monitor) = monitor {
                        monitor.inner.coordinator.cleanup();
                    }
                    Ok(())
                }
            })
            .map_err(|source| RecoveryError::Registration {
                key: CLEANUP_KEY.to_string(),
                source,
            })?;

        Ok(())
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<RecoveryMonitor> {
    weak.upgrade().map(|inner| RecoveryMonitor { inner })
}

impl fmt::Debug for RecoveryMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryMonitor")
            .field("phase", &self.phase())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
