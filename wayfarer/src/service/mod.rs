//! Wiring of the core services.
//!
//! [`CoreServices`] owns one instance of each service for the process and
//! hands out cheap clones. Nothing here is global; tests and embedders can
//! build as many independent sets as they need.
//!
//! # Example
//!
//! ```ignore
//! use wayfarer::config::ConfigFile;
//! use wayfarer::service::CoreServices;
//!
//! let services = CoreServices::builder(ConfigFile::load()?)
//!     .restore_session(true)
//!     .build()?;
//! services.tracker().start_navigation(destination, route, total_m)?;
//! println!("{}", services.diagnostics());
//! services.shutdown();
//! ```

mod builder;
mod error;

pub use builder::CoreServicesBuilder;
pub use error::ServiceError;

use crate::circuit::CircuitRegistry;
use crate::config::ConfigFile;
use crate::coordinator::ResourceCoordinator;
use crate::diagnostics::DiagnosticsReport;
use crate::navigation::NavigationTracker;
use crate::recovery::RecoveryMonitor;
use crate::throttle::ThrottleGovernor;
use tracing::info;

/// The coordinator, governor, circuits, recovery monitor and tracker of
/// one process.
pub struct CoreServices {
    config: ConfigFile,
    coordinator: ResourceCoordinator,
    governor: ThrottleGovernor,
    circuits: CircuitRegistry,
    recovery: RecoveryMonitor,
    tracker: NavigationTracker,
}

impl CoreServices {
    pub fn builder(config: ConfigFile) -> CoreServicesBuilder {
        CoreServicesBuilder::new(config)
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn coordinator(&self) -> &ResourceCoordinator {
        &self.coordinator
    }

    pub fn governor(&self) -> &ThrottleGovernor {
        &self.governor
    }

    pub fn circuits(&self) -> &CircuitRegistry {
        &self.circuits
    }

    pub fn recovery(&self) -> &RecoveryMonitor {
        &self.recovery
    }

    pub fn tracker(&self) -> &NavigationTracker {
        &self.tracker
    }

    pub fn diagnostics(&self) -> DiagnosticsReport {
        DiagnosticsReport::collect(
            &self.coordinator,
            &self.governor,
            &self.circuits,
            Some(&self.recovery),
        )
    }

    /// Save any active session, then stop every timer, subscription and
    /// pending throttled call.
    pub fn shutdown(&self) {
        let saved = self.tracker.save_state();
        self.recovery.stop();
        self.governor.clear();
        self.coordinator.shutdown();
        info!(session_saved = saved, "Core services stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::navigation::{MemoryStore, NavigationPhase};
    use crate::circuit::{classes, CircuitPhase, NetworkError};
    use crate::recovery::{RecoveryPhase, CLEANUP_KEY, HEALTH_CHECK_KEY};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_build_registers_recovery_checks() {
        let services = CoreServices::builder(ConfigFile::default())
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();

        assert!(services.coordinator().has_timer(HEALTH_CHECK_KEY));
        assert!(services.coordinator().has_timer(CLEANUP_KEY));
        assert!(services.diagnostics().is_nominal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_flows_into_services() {
        let mut config = ConfigFile::default();
        config.coordinator.max_timers = 4;
        config.navigation.arrival_radius_m = 10.0;

        let services = CoreServices::builder(config)
            .store(Arc::new(MemoryStore::new()))
            .without_recovery()
            .build()
            .unwrap();

        assert_eq!(services.coordinator().config().max_timers, 4);
        assert_eq!(services.tracker().config().arrival_radius_m, 10.0);
        assert!(services.coordinator().timer_keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_saves_and_restores_session() {
        let store = Arc::new(MemoryStore::new());
        let services = CoreServices::builder(ConfigFile::default())
            .store(store.clone())
            .build()
            .unwrap();
        services
            .tracker()
            .start_navigation(Coordinate::new(0.0, 0.05), Vec::new(), 5_500.0)
            .unwrap();

        services.shutdown();
        assert!(services.coordinator().timer_keys().is_empty());
        assert!(!store.is_empty());

        let resumed = CoreServices::builder(ConfigFile::default())
            .store(store)
            .restore_session(true)
            .build()
            .unwrap();
        assert_eq!(resumed.tracker().phase(), NavigationPhase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_circuit_failures_start_recovery() {
        let services = CoreServices::builder(ConfigFile::default())
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        services
            .coordinator()
            .register_periodic_timer("app.poll", Duration::from_secs(1), || async { Ok(()) })
            .unwrap();

        let routing = services.circuits().get_or_create(classes::ROUTING);
        for _ in 0..6 {
            let _: Result<(), _> = routing
                .execute(|| async { Err(NetworkError::Authentication("expired key".into())) })
                .await;
        }

        assert_eq!(routing.phase(), CircuitPhase::Open);
        let stats = services.recovery().stats();
        assert_eq!(stats.recoveries_started, 1);
        assert_eq!(stats.phase, RecoveryPhase::Recovering);

        tokio::time::sleep(Duration::from_secs(3)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(services.recovery().phase(), RecoveryPhase::Monitoring);
        assert_eq!(services.recovery().stats().recoveries_succeeded, 1);
        assert!(!services.coordinator().has_timer("app.poll"));
        assert!(services.coordinator().has_timer(HEALTH_CHECK_KEY));
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = CoreServices::builder(ConfigFile::default())
            .store(Arc::new(MemoryStore::new()))
            .build();
        assert!(matches!(result, Err(ServiceError::NoRuntime)));
    }
}
