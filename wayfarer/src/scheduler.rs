//! Scheduling primitives shared by the coordination services.
//!
//! Every timer and deferred call in the core goes through a [`Scheduler`],
//! so capacity and failure-isolation logic never talks to the async runtime
//! directly. Callbacks additionally pass through an [`ExecutionLane`], which
//! admits one callback at a time: timer ticks, stream items, queued events
//! and throttled calls never overlap, even on a multi-threaded runtime.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Spawns background work and provides the clock.
pub trait Scheduler: Send + Sync {
    /// Run `task` in the background until it completes.
    fn spawn(&self, task: BoxFuture<'static, ()>);

    /// A future that resolves after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    /// Current instant on this scheduler's clock.
    fn now(&self) -> Instant;
}

/// Shared scheduler handle.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// [`Scheduler`] backed by a tokio runtime.
///
/// Uses tokio's clock, so tests running with a paused clock
/// (`#[tokio::test(start_paused = true)]`) drive every timer deterministically.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Create a scheduler that spawns onto the given runtime.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Create a scheduler for the runtime the caller is running on.
    ///
    /// Returns `None` outside of a tokio runtime.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }

    /// Shared handle for the runtime the caller is running on.
    ///
    /// Must be called from within a tokio runtime.
    pub fn shared() -> SharedScheduler {
        Arc::new(Self::new(tokio::runtime::Handle::current()))
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler").finish_non_exhaustive()
    }
}

impl Scheduler for TokioScheduler {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Single logical execution queue for callbacks.
///
/// Cloning shares the lane. The gate is a fair FIFO mutex, so callbacks are
/// admitted in the order they became ready.
#[derive(Clone, Default)]
pub struct ExecutionLane {
    gate: Arc<Mutex<()>>,
}

impl ExecutionLane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lane to become free and hold it until the guard drops.
    pub async fn enter(&self) -> LaneGuard {
        LaneGuard {
            _guard: Arc::clone(&self.gate).lock_owned().await,
        }
    }

    /// Returns true if a callback currently holds the lane.
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }
}

impl fmt::Debug for ExecutionLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionLane")
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// Exclusive hold on an [`ExecutionLane`].
pub struct LaneGuard {
    _guard: OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_sleep_uses_paused_clock() {
        let scheduler = TokioScheduler::shared();
        let start = scheduler.now();
        scheduler.sleep(Duration::from_secs(30)).await;
        assert!(scheduler.now() - start >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_tokio_scheduler_spawns() {
        let scheduler = TokioScheduler::shared();
        let (tx, rx) = tokio::sync::oneshot::channel();
        scheduler.spawn(Box::pin(async move {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[test]
    fn test_try_current_outside_runtime() {
        assert!(TokioScheduler::try_current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lane_serializes_callbacks() {
        let lane = ExecutionLane::new();
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lane = lane.clone();
            let running = Arc::clone(&running);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = lane.enter().await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(!lane.is_busy());
    }
}
