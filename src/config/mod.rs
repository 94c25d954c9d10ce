//! Configuration management for mediabox
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mediabox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `MEDIABOX__<section>__<key>`:
//! - `MEDIABOX__SERVER__BIND_ADDR=127.0.0.1:9000`
//! - `MEDIABOX__JOBS__EVICTION_TTL_SECS=3600`
//! - `MEDIABOX__FETCHER__EXTRA_ARGS="--no-mtime --geo-bypass"`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mediabox.toml`.
//! This can be overridden using the `MEDIABOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    ApiLimits, Config, FetcherConfig, JobsConfig, LoggingConfig, ServerConfig, TranscoderConfig,
};
pub use sources::config_path;
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
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a
    /// value fails validation (zero intervals, empty binaries, bad bitrate).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path.as_ref())?;
        validation::validate(&config)?;
        Ok(config)
    }
}
