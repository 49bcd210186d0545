//! CLI runner for common setup.
//!
//! Loads configuration and initializes logging once, so command handlers
//! only deal with their own work.

use crate::error::CliError;
use std::path::Path;
use tracing::info;
use wayfarer::config::ConfigFile;
use wayfarer::logging::{init_from_settings, LoggingGuard};

/// Runner that manages CLI lifecycle.
pub struct CliRunner {
    /// Keeps the log writer alive while the runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Load config (from `config_path` if given) and initialize logging.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = load_config(config_path)?;
        let logging_guard =
            init_from_settings(&config.logging).map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!(version = wayfarer::VERSION, command, "Wayfarer starting");
    }
}

/// Load the config file without touching logging.
pub fn load_config(config_path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match config_path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}
