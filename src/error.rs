//! Error handling for Fieldgate Core.
//!
//! This module provides:
//! - A single error type with machine-readable codes
//! - User-friendly messages vs detailed internal messages
//! - Severity classification for logging and alerting
//! - Metrics integration for error tracking
//!
//! Propagation policy (mirrored by the rest of the crate): access-control
//! checks resolve to boolean negatives rather than errors; Data Gateway
//! failures propagate as typed errors at the call site; per-row import
//! failures are absorbed into the job tally, while file-level import
//! failures abort the whole job.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

/// A specialized Result type for Fieldgate operations.
pub type Result<T> = std::result::Result<T, FieldgateError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by the UI layer for programmatic
/// error handling (e.g. showing a distinct message for `PermissionDenied`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication/Authorization
    AuthenticationFailed,
    PermissionDenied,

    // Data Gateway / backend
    ConstraintViolation,
    NetworkError,
    BackendError,
    RecordNotFound,

    // Import Pipeline (file level)
    UnsupportedFormat,
    EmptyFile,

    // Import Pipeline (row level; becomes a Dropped outcome, never surfaced)
    MissingRequiredField,

    // Serialization
    SerializationError,

    // Configuration
    ConfigurationError,

    // Internal
    InternalError,
}

impl ErrorCode {
    /// Check if this error is retryable (retry, if any, is a caller decision;
    /// the gateway itself never retries).
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::BackendError)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed | Self::PermissionDenied => "access",
            Self::ConstraintViolation
            | Self::NetworkError
            | Self::BackendError
            | Self::RecordNotFound => "gateway",
            Self::UnsupportedFormat | Self::EmptyFile | Self::MissingRequiredField => "import",
            Self::SerializationError => "serialization",
            Self::ConfigurationError => "configuration",
            Self::InternalError => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// User errors (bad input, dropped rows, denied access)
    Low,
    /// Operational issues (network failures, backend rejections)
    Medium,
    /// System errors (serialization, configuration, bugs)
    High,
}

impl ErrorSeverity {
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::AuthenticationFailed
            | ErrorCode::PermissionDenied
            | ErrorCode::UnsupportedFormat
            | ErrorCode::EmptyFile
            | ErrorCode::MissingRequiredField
            | ErrorCode::RecordNotFound
            | ErrorCode::ConstraintViolation => Self::Low,

            ErrorCode::NetworkError | ErrorCode::BackendError => Self::Medium,

            ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::InternalError => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Fieldgate Core.
///
/// Carries a user-safe message (shown in transient UI notifications) and an
/// optional internal message for logging only.
#[derive(Error, Debug)]
pub struct FieldgateError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to the UI)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for FieldgateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl FieldgateError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Authentication failure. Bad credentials, identity-provider outages,
    /// and a missing profile all collapse into this one code so callers
    /// cannot distinguish them in the common path.
    pub fn authentication(internal: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::AuthenticationFailed,
            "Sign-in failed. Check your email and password.",
            internal,
        )
    }

    /// Denial by the backend's row-level access policy. Must carry a
    /// user-facing message distinct from other failures.
    pub fn permission_denied() -> Self {
        Self::new(
            ErrorCode::PermissionDenied,
            "Permission denied by security policy",
        )
    }

    /// Uniqueness or foreign-key rejection from the backend.
    pub fn constraint_violation(internal: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConstraintViolation,
            "A record with these details already exists or references a missing record",
            internal,
        )
    }

    /// Network-level failure talking to the backend.
    pub fn network(internal: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::NetworkError,
            "Could not reach the server. Try again.",
            internal,
        )
    }

    /// Unsupported import file format.
    pub fn unsupported_format(extension: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedFormat,
            format!("Only CSV or Excel files are supported (got .{})", extension),
        )
    }

    /// Import file lacks a header row plus at least one data row.
    pub fn empty_file() -> Self {
        Self::new(
            ErrorCode::EmptyFile,
            "File must contain a header row and at least one data row",
        )
    }

    /// A declared required field was null or empty. Internal only; the
    /// pipeline turns this into a Dropped row outcome.
    pub fn missing_required_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("Required field is missing: {}", field),
        )
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "fieldgate_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<reqwest::Error> for FieldgateError {
    fn from(error: reqwest::Error) -> Self {
        let (code, user_msg) = if error.is_timeout() || error.is_connect() {
            (
                ErrorCode::NetworkError,
                "Could not reach the server. Try again.",
            )
        } else if error.is_status() {
            match error.status().map(|s| s.as_u16()) {
                Some(401) | Some(403) => (
                    ErrorCode::PermissionDenied,
                    "Permission denied by security policy",
                ),
                Some(409) => (
                    ErrorCode::ConstraintViolation,
                    "A record with these details already exists or references a missing record",
                ),
                Some(500..=599) => (
                    ErrorCode::BackendError,
                    "The server is temporarily unavailable",
                ),
                _ => (ErrorCode::BackendError, "The server returned an error"),
            }
        } else {
            (ErrorCode::NetworkError, "Network error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for FieldgateError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<std::io::Error> for FieldgateError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An I/O error occurred",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<csv::Error> for FieldgateError {
    fn from(error: csv::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to read CSV data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<calamine::Error> for FieldgateError {
    fn from(error: calamine::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to read spreadsheet data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for FieldgateError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error occurred",
            error.to_string(),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
