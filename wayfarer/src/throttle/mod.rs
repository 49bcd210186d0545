//! Throttling and debouncing of high-frequency signals.
//!
//! Location fixes, gestures and map movement can arrive far faster than the
//! UI or network can absorb. The [`ThrottleGovernor`] gives every event type
//! its own delay and per-second budget so one noisy signal class cannot
//! starve the others.

mod config;
mod governor;
mod stats;

pub use config::{kinds, ThrottleConfig, DEFAULT_DELAY, DEFAULT_MAX_PER_SECOND, RATE_WINDOW};
pub use governor::{ThrottleGovernor, ThrottleOutcome};
pub use stats::{EventTypeStats, ThrottleStats};
