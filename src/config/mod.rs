//! Configuration management for adsync
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Environment Variables
//!
//! Any key can be overridden with `ADSYNC__<section>__<key>`:
//! - `ADSYNC__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `ADSYNC__FETCH__MAX_WAIT_SECS=900`
//! - `ADSYNC__SERVER__MAX_UPLOAD_BYTES=50MB`
//!
//! API credentials are only ever read from `AMAZON_ADS_CLIENT_ID`,
//! `AMAZON_ADS_CLIENT_SECRET` and `AMAZON_ADS_REFRESH_TOKEN`.
//!
//! # Configuration File
//!
//! Loaded from `config/adsync.toml` unless `ADSYNC_CONFIG` points elsewhere.
//! A missing file is not an error.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    AdsConfig, Config, FetchConfig, PerformanceBackend, RetentionConfig, ServerConfig,
    StorageConfig, UploadBackend, WorkerConfig,
};
pub use sources::credentials_from;
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
    /// Load configuration from all sources (file + environment) and validate it
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path; credentials are left unset
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
