//! User configuration loaded from `~/.wayfarer/config.ini`.
//!
//! The file is split by concern: one `[section]` per component, with the
//! throttle tables in their own `[throttle.delay_ms]` and
//! `[throttle.max_per_second]` sections. Each component converts its
//! settings with a `from_settings` constructor on its own config type.
//!
//! # Example
//!
//! ```ignore
//! use wayfarer::config::ConfigFile;
//! use wayfarer::coordinator::CoordinatorConfig;
//!
//! let file = ConfigFile::load()?;
//! let coordinator = CoordinatorConfig::from_settings(&file.coordinator);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{
    config_directory, config_file_path, default_log_dir, default_state_dir, CONFIG_DIR_NAME,
    CONFIG_FILE_NAME, DEFAULT_LOG_FILE,
};
pub use file::ConfigFileError;
pub use settings::{
    CircuitSettings, ConfigFile, CoordinatorSettings, LoggingSettings, NavigationSettings,
    RecoverySettings, ThrottleSettings,
};
