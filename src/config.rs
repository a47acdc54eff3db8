//! Configuration management.

use serde::Deserialize;

use crate::error::{FieldgateError, Result};
use crate::telemetry::LoggingConfig;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend service configuration
    pub backend: BackendConfig,

    /// Gateway cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Import pipeline configuration
    #[serde(default)]
    pub import: ImportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend service
    pub url: String,

    /// Publishable (anonymous) API key sent with every request
    pub anon_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached list keys
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// Storage bucket used to archive uploaded import files
    #[serde(default = "default_archive_bucket")]
    pub archive_bucket: String,

    /// Delimiter used when splitting list-valued cells (e.g. crop lists)
    #[serde(default = "default_list_delimiter")]
    pub list_delimiter: char,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            archive_bucket: default_archive_bucket(),
            list_delimiter: default_list_delimiter(),
        }
    }
}

// Default value functions
fn default_request_timeout() -> u64 {
    30
}
fn default_max_entries() -> usize {
    1_000
}
fn default_archive_bucket() -> String {
    "imports".to_string()
}
fn default_list_delimiter() -> char {
    ','
}

impl Config {
    /// Load configuration from environment variables. A `.env` file in the
    /// working directory is read first, if present.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("FIELDGATE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("FIELDGATE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the backend client cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            return Err(FieldgateError::configuration("backend.url must not be empty"));
        }
        if self.backend.anon_key.trim().is_empty() {
            return Err(FieldgateError::configuration(
                "backend.anon_key must not be empty",
            ));
        }
        Ok(())
    }
}
