//! Handles returned from successful registrations.

use super::error::ResourceKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle to a registered timer or subscription.
///
/// Dropping the handle does not cancel the registration; call
/// [`ResourceHandle::cancel`] or cancel through the coordinator by key.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    key: String,
    kind: ResourceKind,
    token: CancellationToken,
    finished: Arc<AtomicBool>,
}

impl ResourceHandle {
    pub(super) fn new(
        key: String,
        kind: ResourceKind,
        token: CancellationToken,
        finished: Arc<AtomicBool>,
    ) -> Self {
        Self {
            key,
            kind,
            token,
            finished,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns true until the registration is cancelled or has run its course.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.finished.load(Ordering::Acquire)
    }

    /// Stop the underlying task.
    ///
    /// The registry entry is swept by the task itself once it observes the
    /// cancellation, or by the next cleanup pass.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Sets the shared finished flag when the owning task ends, including when
/// the task future is dropped without completing.
pub(super) struct FinishedFlag(pub(super) Arc<AtomicBool>);

impl Drop for FinishedFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}
