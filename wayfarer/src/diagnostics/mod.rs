//! Runtime diagnostics for troubleshooting.
//!
//! Collects the typed statistics every service already exposes into one
//! report suitable for logs and bug reports.
//!
//! # Example
//!
//! ```ignore
//! use wayfarer::diagnostics::DiagnosticsReport;
//!
//! let report = DiagnosticsReport::collect(&coordinator, &governor, &circuits, Some(&recovery));
//! println!("{}", report);
//! ```

use std::fmt;
use std::time::Duration;

use crate::circuit::{CircuitRegistry, CircuitStats};
use crate::coordinator::{CoordinatorStats, ResourceCoordinator};
use crate::recovery::{RecoveryMonitor, RecoveryStats};
use crate::throttle::{ThrottleGovernor, ThrottleStats};

/// Point-in-time diagnostics across all services.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub version: String,
    pub coordinator: CoordinatorStats,
    /// Limits the coordinator counts are measured against.
    pub caps: Caps,
    pub throttle: ThrottleStats,
    pub circuits: Vec<CircuitStats>,
    /// Absent when no recovery monitor is running.
    pub recovery: Option<RecoveryStats>,
}

/// Coordinator capacity limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    pub timers: usize,
    pub subscriptions: usize,
    pub queued_events: usize,
}

impl DiagnosticsReport {
    /// Collect diagnostics from running services.
    pub fn collect(
        coordinator: &ResourceCoordinator,
        governor: &ThrottleGovernor,
        circuits: &CircuitRegistry,
        recovery: Option<&RecoveryMonitor>,
    ) -> Self {
        let config = coordinator.config();
        Self {
            version: crate::VERSION.to_string(),
            coordinator: coordinator.stats(),
            caps: Caps {
                timers: config.max_timers,
                subscriptions: config.max_subscriptions,
                queued_events: config.max_queued_events,
            },
            throttle: governor.stats(),
            circuits: circuits.stats(),
            recovery: recovery.map(RecoveryMonitor::stats),
        }
    }

    /// True when nothing in the report needs an operator's attention.
    pub fn is_nominal(&self) -> bool {
        let recovery_ok = self
            .recovery
            .as_ref()
            .map_or(true, |stats| stats.phase != crate::recovery::RecoveryPhase::Degraded);
        self.coordinator.health.is_healthy
            && recovery_ok
            && self.circuits.iter().all(|circuit| !circuit.stuck_open)
    }
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Wayfarer Diagnostics")?;
        writeln!(f, "====================")?;
        writeln!(f)?;
        writeln!(f, "Wayfarer Version: {}", self.version)?;
        writeln!(f)?;

        // Coordinator
        let c = &self.coordinator;
        writeln!(f, "## Coordinator")?;
        writeln!(
            f,
            "Timers: {}/{}  Subscriptions: {}/{}  Queued events: {}/{}",
            c.health.active_timers,
            self.caps.timers,
            c.health.active_subscriptions,
            self.caps.subscriptions,
            c.health.queued_events,
            self.caps.queued_events
        )?;
        writeln!(f, "Healthy: {}", if c.health.is_healthy { "yes" } else { "no" })?;
        writeln!(
            f,
            "Timers fired: {}  Callback failures: {}  Rejected registrations: {}",
            c.timers_fired, c.callback_failures, c.rejected_registrations
        )?;
        writeln!(
            f,
            "Events processed: {}  Events dropped: {}",
            c.events_processed, c.events_dropped
        )?;
        writeln!(f)?;

        // Throttle
        writeln!(f, "## Throttle")?;
        if self.throttle.types.is_empty() {
            writeln!(f, "No events seen")?;
        }
        for (kind, stats) in &self.throttle.types {
            writeln!(
                f,
                "{}: {}/window, fired {}, dropped {}, coalesced {}{}",
                kind,
                stats.events_in_window,
                stats.fired,
                stats.dropped,
                stats.coalesced,
                if stats.pending { " (pending)" } else { "" }
            )?;
        }
        writeln!(f)?;

        // Circuits
        writeln!(f, "## Circuits")?;
        if self.circuits.is_empty() {
            writeln!(f, "No circuits")?;
        }
        for circuit in &self.circuits {
            write!(
                f,
                "{}: {} ({} calls, {} failures, {} rejected, opened {}x)",
                circuit.name,
                circuit.phase,
                circuit.total_calls,
                circuit.total_failures,
                circuit.rejected_calls,
                circuit.times_opened
            )?;
            if let Some(tripped) = circuit.tripped_for {
                write!(f, " tripped for {}", format_duration(tripped))?;
            }
            if circuit.stuck_open {
                write!(f, " [STUCK OPEN]")?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        // Recovery
        writeln!(f, "## Recovery")?;
        match &self.recovery {
            None => writeln!(f, "Not running")?,
            Some(r) => {
                writeln!(f, "Phase: {}", r.phase)?;
                writeln!(
                    f,
                    "Overloads: {}  Consecutive errors: {}  Health checks: {}",
                    r.overload_count, r.consecutive_errors, r.health_checks
                )?;
                writeln!(
                    f,
                    "Recoveries: {} started, {} succeeded, {} failed",
                    r.recoveries_started, r.recoveries_succeeded, r.recovery_failures
                )?;
                if let Some(since) = r.since_last_recovery {
                    writeln!(f, "Last recovery: {} ago", format_duration(since))?;
                }
            }
        }

        Ok(())
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:01}s", secs, duration.subsec_millis() / 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitBreakerConfig;
    use crate::coordinator::CoordinatorConfig;
    use crate::scheduler::TokioScheduler;
    use crate::throttle::ThrottleConfig;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m15s");
        assert_eq!(format_duration(Duration::from_secs(3720)), "1h02m");
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_and_display() {
        let scheduler = TokioScheduler::shared();
        let coordinator = ResourceCoordinator::new(CoordinatorConfig::default(), scheduler.clone());
        let governor = ThrottleGovernor::new(ThrottleConfig::default(), scheduler.clone());
        let circuits = CircuitRegistry::new(CircuitBreakerConfig::default(), scheduler);
        circuits.get_or_create("routing");
        governor.throttle("map_move", || {});

        let report = DiagnosticsReport::collect(&coordinator, &governor, &circuits, None);
        assert!(report.is_nominal());
        assert_eq!(report.caps.timers, 15);
        assert_eq!(report.circuits.len(), 1);

        let text = report.to_string();
        assert!(text.contains("Timers: 0/15"));
        assert!(text.contains("map_move: 1/window"));
        assert!(text.contains("routing: closed"));
        assert!(text.contains("Not running"));
    }
}
