//! Wayfarer - resource coordination and route tracking for navigation apps
//!
//! This library provides the runtime core behind a navigation front end:
//! bounded timers and stream subscriptions, per-event-type throttling,
//! circuit breaking for provider calls, overload recovery, and a
//! navigation tracker that turns position fixes into progress events.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module wires everything together:
//!
//! ```ignore
//! use wayfarer::config::ConfigFile;
//! use wayfarer::service::CoreServices;
//!
//! let services = CoreServices::builder(ConfigFile::load()?).build()?;
//! services.tracker().start_navigation(destination, route, total_m)?;
//! let mut progress = services.tracker().subscribe().expect("active");
//! ```

pub mod circuit;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod geo;
pub mod logging;
pub mod navigation;
pub mod recovery;
pub mod scheduler;
pub mod service;
pub mod throttle;

/// Version of the Wayfarer library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
