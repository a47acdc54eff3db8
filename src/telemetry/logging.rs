//! Structured logging with JSON and pretty formats.
//!
//! JSON format is the default for production environments; pretty format is
//! for development. Levels come from the configuration and can be overridden
//! per module via `RUST_LOG`.

use serde::Deserialize;
use std::collections::HashMap;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty, or compact)
    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Whether to include file/line information
    #[serde(default = "default_include_location")]
    pub include_location: bool,

    /// Whether to include target (module path)
    #[serde(default = "default_include_target")]
    pub include_target: bool,

    /// Log when spans close (captures duration)
    #[serde(default)]
    pub span_close_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: default_include_location(),
            include_target: default_include_target(),
            span_close_events: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format for production/structured logging
    #[default]
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact single-line format
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_include_location() -> bool {
    false
}
fn default_include_target() -> bool {
    true
}

impl LoggingConfig {
    fn env_filter(&self) -> EnvFilter {
        let mut directives = self.level.clone();
        for (module, level) in &self.module_levels {
            directives.push_str(&format!(",{}={}", module, level));
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_close_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Initialize the global tracing subscriber from configuration.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = config.env_filter();

    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target)
                .with_span_events(config.span_events());
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target)
                .with_span_events(config.span_events());
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()?;
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target)
                .with_span_events(config.span_events());
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.include_location);
        assert!(config.include_target);
    }

    #[test]
    fn test_span_events() {
        let mut config = LoggingConfig::default();
        assert_eq!(config.span_events(), FmtSpan::NONE);
        config.span_close_events = true;
        assert_eq!(config.span_events(), FmtSpan::CLOSE);
    }
}
