//! Turn-by-turn progress tracking.
//!
//! The [`NavigationTracker`] consumes position fixes, keeps a smoothed speed
//! and remaining distance for the active session, and broadcasts throttled
//! [`ProgressEvent`]s until the destination is reached. Sessions can be
//! saved to a [`KeyValueStore`] and resumed after a restart.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wayfarer::geo::Coordinate;
//! use wayfarer::navigation::{MemoryStore, NavigationConfig, NavigationTracker};
//!
//! let tracker = NavigationTracker::builder(NavigationConfig::default(), coordinator, governor)
//!     .store(Arc::new(MemoryStore::new()))
//!     .build();
//! tracker.start_navigation(Coordinate::new(48.8566, 2.3522), route, 12_500.0)?;
//! let mut progress = tracker.subscribe().expect("session is active");
//! ```

mod config;
mod error;
mod source;
mod state;
mod store;
mod tracker;

pub use config::{
    NavigationConfig, DEFAULT_ARRIVAL_RADIUS_M, DEFAULT_BROADCAST_INTERVAL,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_SPEED_KMH, DEFAULT_MIN_SPEED_KMH,
    DEFAULT_RESTORE_MAX_AGE, DEFAULT_SAMPLING_INTERVAL, DEFAULT_SPEED_SMOOTHING,
    DEFAULT_STATE_KEY, DEFAULT_WAYPOINT_TOLERANCE_M,
};
pub use error::TrackerError;
pub use source::{
    PositionError, PositionSample, PositionSource, PositionStream, SimulatedPositionSource,
};
pub use state::{NavigationPhase, NavigationSession, PositionOutcome, ProgressEvent, SavedSession};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use tracker::{NavigationTracker, NavigationTrackerBuilder};
