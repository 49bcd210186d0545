//! Builder that wires the core services together.
//!
//! All services share one scheduler and one execution lane, so coordinator
//! callbacks and throttled callbacks never overlap.

use super::error::ServiceError;
use super::CoreServices;
use crate::circuit::{CircuitBreakerConfig, CircuitRegistry};
use crate::config::ConfigFile;
use crate::coordinator::{CoordinatorConfig, ResourceCoordinator};
use crate::navigation::{
    FileStore, KeyValueStore, NavigationConfig, NavigationTracker, PositionSource,
};
use crate::recovery::{RecoveryConfig, RecoveryMonitor};
use crate::scheduler::{ExecutionLane, SharedScheduler, TokioScheduler};
use crate::throttle::{ThrottleConfig, ThrottleGovernor};
use std::sync::Arc;
use tracing::info;

/// Builder for [`CoreServices`].
pub struct CoreServicesBuilder {
    config: ConfigFile,
    scheduler: Option<SharedScheduler>,
    store: Option<Arc<dyn KeyValueStore>>,
    source: Option<Arc<dyn PositionSource>>,
    start_recovery: bool,
    restore_session: bool,
}

impl CoreServicesBuilder {
    pub fn new(config: ConfigFile) -> Self {
        Self {
            config,
            scheduler: None,
            store: None,
            source: None,
            start_recovery: true,
            restore_session: false,
        }
    }

    /// Use this scheduler instead of the current Tokio runtime.
    pub fn scheduler(mut self, scheduler: SharedScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Persist sessions here instead of a file store under `state_dir`.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Position source polled by the navigation tracker.
    pub fn position_source(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Do not register the recovery monitor's periodic checks.
    pub fn without_recovery(mut self) -> Self {
        self.start_recovery = false;
        self
    }

    /// Resume a saved navigation session during build.
    pub fn restore_session(mut self, restore: bool) -> Self {
        self.restore_session = restore;
        self
    }

    pub fn build(self) -> Result<CoreServices, ServiceError> {
        let scheduler = match self.scheduler {
            Some(scheduler) => scheduler,
            None => {
                let tokio = TokioScheduler::try_current().ok_or(ServiceError::NoRuntime)?;
                Arc::new(tokio) as SharedScheduler
            }
        };
        let lane = ExecutionLane::new();

        let coordinator = ResourceCoordinator::with_lane(
            CoordinatorConfig::from_settings(&self.config.coordinator),
            Arc::clone(&scheduler),
            lane.clone(),
        );
        let governor = ThrottleGovernor::with_lane(
            ThrottleConfig::from_settings(&self.config.throttle),
            Arc::clone(&scheduler),
            lane,
        );
        let circuits = CircuitRegistry::new(
            CircuitBreakerConfig::from_settings(&self.config.circuit),
            scheduler,
        );
        let recovery = RecoveryMonitor::new(
            RecoveryConfig::from_settings(&self.config.recovery),
            coordinator.clone(),
            governor.clone(),
            circuits.clone(),
        );

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::new(&self.config.navigation.state_dir)?),
        };
        let mut tracker = NavigationTracker::builder(
            NavigationConfig::from_settings(&self.config.navigation),
            coordinator.clone(),
            governor.clone(),
        )
        .store(store);
        if let Some(source) = self.source {
            tracker = tracker.source(source);
        }
        let tracker = tracker.build();
        recovery.add_hook(Arc::new(tracker.clone()));

        if self.start_recovery {
            recovery.start_recovery()?;
        }
        if self.restore_session && tracker.restore_state() {
            info!("Resumed saved navigation session");
        }

        info!(
            max_timers = self.config.coordinator.max_timers,
            max_subscriptions = self.config.coordinator.max_subscriptions,
            recovery = self.start_recovery,
            "Core services started"
        );

        Ok(CoreServices {
            config: self.config,
            coordinator,
            governor,
            circuits,
            recovery,
            tracker,
        })
    }
}
