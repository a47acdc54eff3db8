//! Telemetry infrastructure: structured logging.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig};
