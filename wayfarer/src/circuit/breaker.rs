//! Three-state circuit breaker for unreliable network calls.
//!
//! # State Machine
//!
//! ```text
//! Closed --[max_failures consecutive failures]--> Open
//! Open --[reset_timeout elapsed]--> HalfOpen
//! HalfOpen --[trial succeeds]--> Closed
//! HalfOpen --[trial fails]--> Open (reset timer restarts)
//! HalfOpen --[half_open_timeout elapsed, no trial, no failures]--> Closed
//! ```
//!
//! Transitions driven by time are evaluated lazily whenever the breaker is
//! consulted, so an idle breaker costs nothing.

use super::config::CircuitBreakerConfig;
use super::error::{CircuitError, NetworkError};
use crate::recovery::FailureReporter;
use crate::scheduler::SharedScheduler;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Phase of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitPhase {
    /// Calls run normally.
    Closed,
    /// Calls are rejected without running.
    Open,
    /// The next call is let through as a trial.
    HalfOpen,
}

impl CircuitPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitPhase::Closed => "closed",
            CircuitPhase::Open => "open",
            CircuitPhase::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call overrides for [`CircuitBreaker::execute_with`].
#[derive(Debug, Clone)]
pub struct CallOptions<T> {
    /// Returned instead of an error when the circuit rejects the call.
    pub fallback: Option<T>,
    /// Replaces the configured call timeout.
    pub timeout: Option<Duration>,
}

impl<T> Default for CallOptions<T> {
    fn default() -> Self {
        Self {
            fallback: None,
            timeout: None,
        }
    }
}

impl<T> CallOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Snapshot of a breaker for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitStats {
    pub name: String,
    pub phase: CircuitPhase,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    /// Calls rejected (or served from fallback) while open.
    pub rejected_calls: u64,
    pub times_opened: u64,
    pub since_last_failure: Option<Duration>,
    /// How long the circuit has been continuously tripped.
    pub tripped_for: Option<Duration>,
    /// Tripped for longer than `open_alert_after`.
    pub stuck_open: bool,
}

#[derive(Debug)]
struct BreakerState {
    phase: CircuitPhase,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    half_open_since: Option<Instant>,
    /// First opening since the circuit was last closed.
    tripped_at: Option<Instant>,
    trial_in_flight: bool,
    stuck_reported: bool,
    total_calls: u64,
    total_failures: u64,
    rejected_calls: u64,
    times_opened: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            opened_at: None,
            half_open_since: None,
            tripped_at: None,
            trial_in_flight: false,
            stuck_reported: false,
            total_calls: 0,
            total_failures: 0,
            rejected_calls: 0,
            times_opened: 0,
        }
    }
}

enum Admission {
    Normal,
    Trial,
}

/// Clears the trial flag if a trial call is abandoned mid-flight.
struct TrialGuard<'a> {
    state: &'a Mutex<BreakerState>,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().trial_in_flight = false;
        }
    }
}

/// Circuit breaker guarding one class of network operation.
///
/// # Example
///
/// ```ignore
/// use wayfarer::circuit::{CallOptions, CircuitBreaker, CircuitBreakerConfig};
///
/// let breaker = CircuitBreaker::new("routing", CircuitBreakerConfig::default(), scheduler);
/// let route = breaker
///     .execute_with(|| provider.route(from, to), CallOptions::new().with_fallback(straight_line))
///     .await?;
/// ```
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    scheduler: SharedScheduler,
    state: Mutex<BreakerState>,
    reporter: FailureReporter,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        scheduler: SharedScheduler,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            scheduler,
            state: Mutex::new(BreakerState::new()),
            reporter: FailureReporter::new(),
        }
    }

    /// Report calls that end in [`CircuitError::Failed`] through `reporter`.
    pub fn with_reporter(mut self, reporter: FailureReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current phase, after applying any elapsed timeouts.
    pub fn phase(&self) -> CircuitPhase {
        let now = self.scheduler.now();
        let mut state = self.state.lock();
        self.advance(&mut state, now);
        state.phase
    }

    /// Run `operation` through the breaker with the configured timeout.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, CircuitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NetworkError>>,
    {
        self.execute_with(operation, CallOptions::default()).await
    }

    /// Run `operation` through the breaker.
    ///
    /// While open the call is rejected without running; the fallback is
    /// returned if one was supplied. Retryable failures are retried per the
    /// configured [`RetryPolicy`](super::RetryPolicy) except during a
    /// half-open trial. A call that still fails, including by timeout,
    /// counts as one failure.
    pub async fn execute_with<T, F, Fut>(
        &self,
        mut operation: F,
        options: CallOptions<T>,
    ) -> Result<T, CircuitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NetworkError>>,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(retry_in) => {
                return match options.fallback {
                    Some(fallback) => {
                        debug!(circuit = %self.name, "Circuit open, returning fallback");
                        Ok(fallback)
                    }
                    None => Err(CircuitError::Open {
                        name: self.name.clone(),
                        retry_in,
                    }),
                };
            }
        };

        let mut guard = TrialGuard {
            state: &self.state,
            armed: matches!(admission, Admission::Trial),
        };
        let timeout = options.timeout.unwrap_or(self.config.call_timeout);
        let max_attempts = if guard.armed {
            1
        } else {
            self.config.retry.max_attempts.max(1)
        };

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self.call_once(&mut operation, timeout).await {
                Ok(value) => break Ok(value),
                Err(error) if attempt < max_attempts && error.is_retryable() => {
                    let delay = self.config.retry.delay_for(attempt - 1, &error);
                    debug!(
                        circuit = %self.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after retryable failure"
                    );
                    self.scheduler.sleep(delay).await;
                }
                Err(error) => break Err(error),
            }
        };

        guard.armed = false;
        let now = self.scheduler.now();
        let mut state = self.state.lock();
        state.trial_in_flight = false;
        match result {
            Ok(value) => {
                self.on_success(&mut state);
                Ok(value)
            }
            Err(error) => {
                self.on_failure(&mut state, now, &error);
                drop(state);
                let error = CircuitError::Failed {
                    name: self.name.clone(),
                    source: error,
                };
                self.reporter.report_error(&self.name, &error);
                Err(error)
            }
        }
    }

    pub fn stats(&self) -> CircuitStats {
        let now = self.scheduler.now();
        let mut state = self.state.lock();
        self.advance(&mut state, now);
        let tripped_for = state.tripped_at.map(|at| now.saturating_duration_since(at));
        CircuitStats {
            name: self.name.clone(),
            phase: state.phase,
            consecutive_failures: state.consecutive_failures,
            total_calls: state.total_calls,
            total_failures: state.total_failures,
            rejected_calls: state.rejected_calls,
            times_opened: state.times_opened,
            since_last_failure: state
                .last_failure_at
                .map(|at| now.saturating_duration_since(at)),
            tripped_for,
            stuck_open: tripped_for.is_some_and(|d| d >= self.config.open_alert_after),
        }
    }

    /// Force the circuit closed and clear its failure count.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.phase != CircuitPhase::Closed {
            info!(circuit = %self.name, from = %state.phase, "Circuit breaker reset");
        }
        Self::close(&mut state);
    }

    async fn call_once<T, F, Fut>(&self, operation: &mut F, timeout: Duration) -> Result<T, NetworkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NetworkError>>,
    {
        tokio::select! {
            result = operation() => result,
            _ = self.scheduler.sleep(timeout) => Err(NetworkError::Timeout(timeout)),
        }
    }

    /// Decide whether a call may run. `Err` carries the time until the next
    /// trial is allowed.
    fn admit(&self) -> Result<Admission, Duration> {
        let now = self.scheduler.now();
        let mut state = self.state.lock();
        self.advance(&mut state, now);

        let admission = match state.phase {
            CircuitPhase::Closed => Ok(Admission::Normal),
            CircuitPhase::HalfOpen if !state.trial_in_flight => {
                state.trial_in_flight = true;
                debug!(circuit = %self.name, "Allowing half-open trial call");
                Ok(Admission::Trial)
            }
            CircuitPhase::HalfOpen => Err(Duration::ZERO),
            CircuitPhase::Open => {
                let open_for = state
                    .opened_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or_default();
                Err(self.config.reset_timeout.saturating_sub(open_for))
            }
        };

        match admission {
            Ok(_) => state.total_calls += 1,
            Err(_) => state.rejected_calls += 1,
        }
        admission
    }

    fn advance(&self, state: &mut BreakerState, now: Instant) {
        if state.phase == CircuitPhase::Open {
            let reset_due = state
                .opened_at
                .is_some_and(|at| now.saturating_duration_since(at) >= self.config.reset_timeout);
            if reset_due {
                state.phase = CircuitPhase::HalfOpen;
                state.half_open_since = Some(now);
                state.consecutive_failures = 0;
                info!(circuit = %self.name, "Circuit breaker half-open, next call is a trial");
            }
        }

        if state.phase == CircuitPhase::HalfOpen && !state.trial_in_flight && state.consecutive_failures == 0 {
            let idle_due = state
                .half_open_since
                .is_some_and(|at| now.saturating_duration_since(at) >= self.config.half_open_timeout);
            if idle_due {
                info!(circuit = %self.name, "Circuit breaker CLOSED after idle half-open period");
                Self::close(state);
            }
        }

        if !state.stuck_reported {
            if let Some(tripped_at) = state.tripped_at {
                let tripped_for = now.saturating_duration_since(tripped_at);
                if tripped_for >= self.config.open_alert_after {
                    state.stuck_reported = true;
                    error!(
                        circuit = %self.name,
                        tripped_secs = tripped_for.as_secs(),
                        phase = %state.phase,
                        "Circuit breaker stuck open"
                    );
                }
            }
        }
    }

    fn on_success(&self, state: &mut BreakerState) {
        match state.phase {
            CircuitPhase::HalfOpen => {
                info!(circuit = %self.name, "Trial call succeeded, circuit breaker CLOSED");
                Self::close(state);
            }
            _ => state.consecutive_failures = 0,
        }
    }

    fn on_failure(&self, state: &mut BreakerState, now: Instant, error: &NetworkError) {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.total_failures += 1;
        state.last_failure_at = Some(now);

        match state.phase {
            CircuitPhase::HalfOpen => {
                warn!(circuit = %self.name, error = %error, "Trial call failed, circuit breaker re-OPENED");
                self.open(state, now);
            }
            CircuitPhase::Closed if state.consecutive_failures >= self.config.max_failures => {
                warn!(
                    circuit = %self.name,
                    failures = state.consecutive_failures,
                    error = %error,
                    "Circuit breaker OPENED"
                );
                self.open(state, now);
            }
            _ => debug!(
                circuit = %self.name,
                failures = state.consecutive_failures,
                error = %error,
                "Circuit call failed"
            ),
        }
    }

    fn open(&self, state: &mut BreakerState, now: Instant) {
        state.phase = CircuitPhase::Open;
        state.opened_at = Some(now);
        state.half_open_since = None;
        state.tripped_at.get_or_insert(now);
        state.times_opened += 1;
    }

    fn close(state: &mut BreakerState) {
        state.phase = CircuitPhase::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.half_open_since = None;
        state.tripped_at = None;
        state.stuck_reported = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::RetryPolicy;
    use crate::scheduler::TokioScheduler;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(config: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new("routing", config, TokioScheduler::shared())
    }

    fn no_retry() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            retry: RetryPolicy::none(),
            ..Default::default()
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<u32, CircuitError> {
        breaker
            .execute(|| async { Err(NetworkError::Server { status: 503, message: "down".into() }) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, CircuitError> {
        breaker.execute(|| async { Ok(7) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_max_failures() {
        let breaker = breaker(no_retry());
        for _ in 0..2 {
            assert!(fail(&breaker).await.is_err());
            assert_eq!(breaker.phase(), CircuitPhase::Closed);
        }
        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.phase(), CircuitPhase::Open);

        let rejected = succeed(&breaker).await.unwrap_err();
        assert!(rejected.is_open());
        assert_eq!(breaker.stats().rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_running() {
        let breaker = breaker(no_retry());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = breaker
            .execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, NetworkError>(1) }
            })
            .await;
        assert!(matches!(result, Err(CircuitError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_returned_while_open() {
        let breaker = breaker(no_retry());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        let value = breaker
            .execute_with(|| async { Ok(1) }, CallOptions::new().with_fallback(99))
            .await
            .unwrap();
        assert_eq!(value, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let breaker = breaker(no_retry());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(breaker.phase(), CircuitPhase::HalfOpen);

        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.phase(), CircuitPhase::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let breaker = breaker(no_retry());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.phase(), CircuitPhase::Open);
        assert_eq!(breaker.stats().times_opened, 2);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(breaker.phase(), CircuitPhase::Open);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(breaker.phase(), CircuitPhase::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_self_closes_without_trial() {
        let breaker = breaker(no_retry());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(breaker.phase(), CircuitPhase::HalfOpen);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(breaker.phase(), CircuitPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let breaker = breaker(CircuitBreakerConfig {
            call_timeout: Duration::from_secs(10),
            ..no_retry()
        });
        let result = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            })
            .await;
        assert_eq!(
            result.unwrap_err(),
            CircuitError::Failed {
                name: "routing".into(),
                source: NetworkError::Timeout(Duration::from_secs(10)),
            }
        );
        assert_eq!(breaker.stats().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_timeout_override() {
        let breaker = breaker(no_retry());
        let result = breaker
            .execute_with(
                || async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    Ok(1)
                },
                CallOptions::new().with_timeout(Duration::from_secs(1)),
            )
            .await;
        assert!(matches!(
            result,
            Err(CircuitError::Failed {
                source: NetworkError::Timeout(_),
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let breaker = breaker(CircuitBreakerConfig::default());
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let value = breaker
            .execute(move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(NetworkError::Transient("reset".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.stats().total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_fails_fast() {
        let breaker = breaker(CircuitBreakerConfig::default());
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<u32, _> = breaker
            .execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(NetworkError::Authentication("expired token".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.stats().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_failures() {
        let breaker = breaker(no_retry());
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;
        assert_eq!(breaker.phase(), CircuitPhase::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_open_reported() {
        let breaker = breaker(CircuitBreakerConfig {
            open_alert_after: Duration::from_secs(120),
            ..no_retry()
        });
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert!(!breaker.stats().stuck_open);

        // Trial fails, circuit stays tripped
        tokio::time::sleep(Duration::from_secs(60)).await;
        let _ = fail(&breaker).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        let stats = breaker.stats();
        assert!(stats.stuck_open);
        assert_eq!(stats.tripped_for, Some(Duration::from_secs(120)));

        breaker.reset();
        assert!(!breaker.stats().stuck_open);
        assert_eq!(breaker.phase(), CircuitPhase::Closed);
    }
}
