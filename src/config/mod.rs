//! Configuration management for costdash
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use costdash::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("API origin: {}", config.api.base_url);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `COSTDASH__<section>__<key>`
//!
//! Examples:
//! - `COSTDASH__API__BASE_URL=https://cost.example.com`
//! - `COSTDASH__REQUESTS__GET_TIMEOUT=45s`
//! - `COSTDASH__POLLING__MAX_NOT_FOUND_POLLS=60`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/costdash.toml`.
//! This can be overridden using the `COSTDASH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    ApiConfig, Config, PollingConfig, PreferencesConfig, RequestConfig, ScanConfig,
    TelemetryConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`COSTDASH__*`)
    /// 2. TOML file (default: `config/costdash.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (relative base URL, backoff ratio, zero intervals, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration assembled in code
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}
