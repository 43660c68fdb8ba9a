//! Error types for the migration engine.
//!
//! One enum covers the whole pipeline so callers can match on the failure
//! class: remote API errors carry the server's error code and message,
//! local skips (missing asset, unknown record) are distinct from remote
//! failures, and transient errors are identified for the retry layer.

use std::path::PathBuf;
use thiserror::Error;

use crate::remote::classify;

/// Main error type for the migration engine.
#[derive(Debug, Error)]
pub enum GlamliftError {
    // Remote errors
    #[error("API error [{code}]: {info}")]
    Api { code: String, info: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout")]
    Timeout,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("File not found on remote: {0}")]
    RemoteFileMissing(String),

    // Local errors
    #[error("Record not found in ledger: {0}")]
    RecordNotFound(String),

    #[error("Local asset missing: {0}")]
    LocalAssetMissing(PathBuf),

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, GlamliftError>;

// Conversion implementations for common error types

impl From<std::io::Error> for GlamliftError {
    fn from(err: std::io::Error) -> Self {
        GlamliftError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for GlamliftError {
    fn from(err: serde_json::Error) -> Self {
        GlamliftError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for GlamliftError {
    fn from(err: rusqlite::Error) -> Self {
        GlamliftError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for GlamliftError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GlamliftError::Timeout
        } else {
            GlamliftError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl GlamliftError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        GlamliftError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a retry.
    ///
    /// Network and timeout errors are always transient. API errors are
    /// transient only when the server's error code or message matches a
    /// known transient signature; everything else (bad token, permission
    /// denied, invalid value) is permanent and surfaces immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            GlamliftError::Network { .. } | GlamliftError::Timeout => true,
            GlamliftError::Api { code, info } => {
                classify::is_transient(code) || classify::is_transient(info)
            }
            _ => false,
        }
    }
}
