// src/error.rs

//! Unified error handling for the aggregation engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream transport or protocol failure; the job retries on the
    /// next trigger without mutating the store.
    #[error("source '{source_name}' unavailable: {message}")]
    SourceUnavailable { source_name: String, message: String },

    /// Upstream was reachable but the body violates the expected shape.
    /// Fatal for the current job; usually means upstream drift.
    #[error("malformed payload from '{source_name}': {message}")]
    MalformedPayload { source_name: String, message: String },

    /// Store read or write failed
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Deletion phase aborted: the source returned nothing while the
    /// store holds more than one ban for it.
    #[error(
        "refusing to delete {stored_count} stored bans for '{source_name}': source returned no bans"
    )]
    SafetyAbort { source_name: String, stored_count: usize },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (startup only)
    #[error("configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a source-unavailable error.
    pub fn unavailable(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_name: source.into(),
            message: message.to_string(),
        }
    }

    /// Create a malformed-payload error.
    pub fn malformed(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::MalformedPayload {
            source_name: source.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether a job hitting this error may simply wait for its next
    /// trigger without operator attention (no store mutation happened).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}
