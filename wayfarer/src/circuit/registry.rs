//! Named circuit breakers sharing one configuration.

use super::breaker::{CircuitBreaker, CircuitStats};
use super::config::CircuitBreakerConfig;
use crate::recovery::FailureReporter;
use crate::scheduler::SharedScheduler;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Well-known operation classes.
pub mod classes {
    pub const ROUTING: &str = "routing";
    pub const GEOCODING: &str = "geocoding";
    pub const TRAFFIC: &str = "traffic";
}

/// One breaker per operation class, created on first use.
///
/// Every breaker shares the registry's [`FailureReporter`], so failed calls
/// reach the recovery monitor once one is bound.
#[derive(Clone)]
pub struct CircuitRegistry {
    config: CircuitBreakerConfig,
    scheduler: SharedScheduler,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    reporter: FailureReporter,
}

impl CircuitRegistry {
    pub fn new(config: CircuitBreakerConfig, scheduler: SharedScheduler) -> Self {
        Self {
            config,
            scheduler,
            breakers: Arc::new(DashMap::new()),
            reporter: FailureReporter::new(),
        }
    }

    pub fn failure_reporter(&self) -> &FailureReporter {
        &self.reporter
    }

    /// Breaker for `name`, creating it with the shared configuration if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(circuit = name, "Creating circuit breaker");
                Arc::new(
                    CircuitBreaker::new(name, self.config.clone(), Arc::clone(&self.scheduler))
                        .with_reporter(self.reporter.clone()),
                )
            });
        Arc::clone(breaker.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Stats for every breaker, sorted by name.
    pub fn stats(&self) -> Vec<CircuitStats> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut stats: Vec<CircuitStats> = breakers.iter().map(|breaker| breaker.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Close every breaker that is stuck open. Returns how many were reset.
    pub fn reset_stuck(&self) -> usize {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut reset = 0;
        for breaker in breakers {
            if breaker.stats().stuck_open {
                breaker.reset();
                reset += 1;
            }
        }
        reset
    }

    /// Names of breakers reported stuck open.
    pub fn stuck_open(&self) -> Vec<String> {
        self.stats()
            .into_iter()
            .filter(|stats| stats.stuck_open)
            .map(|stats| stats.name)
            .collect()
    }
}

impl fmt::Debug for CircuitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitRegistry")
            .field("breakers", &self.breakers.len())
            .finish_non_exhaustive()
    }
}
