//! Resource coordination for timers, stream subscriptions and deferred events.
//!
//! The [`ResourceCoordinator`] is the single owner of every recurring timer
//! and stream binding in the process. It enforces fixed capacity caps,
//! isolates callback failures, and offers a bounded priority queue for
//! deferred work.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wayfarer::coordinator::{CoordinatorConfig, ResourceCoordinator};
//! use wayfarer::scheduler::TokioScheduler;
//!
//! let coordinator = ResourceCoordinator::new(CoordinatorConfig::default(), TokioScheduler::shared());
//! coordinator.register_periodic_timer("heartbeat", Duration::from_secs(5), || async {
//!     tracing::debug!("tick");
//!     Ok(())
//! })?;
//! ```

mod config;
mod core;
mod error;
mod handle;
mod health;
mod queue;
mod subscription;

pub use self::core::ResourceCoordinator;
pub(crate) use self::core::panic_message;
pub use config::{
    CoordinatorConfig, DEFAULT_MAX_QUEUED_EVENTS, DEFAULT_MAX_SUBSCRIPTIONS, DEFAULT_MAX_TIMERS,
};
pub use error::{CallbackError, CallbackResult, CoordinatorError, ResourceKind};
pub use handle::ResourceHandle;
pub use health::{CoordinatorStats, HealthSnapshot};
pub use subscription::SubscriptionHandlers;
