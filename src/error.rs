/// Unified error handling for shardmon
///
/// This module provides the error types shared by the control plane, the
/// probe transports and the configuration layer. Per-endpoint failures are
/// carried as [`RemoteError`] values inside published stats; only failures
/// that abort a whole operation surface as [`MonitorError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Main error type for shardmon operations
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Topology snapshot could not be read
    #[error("Snapshot error: {message}")]
    Snapshot { message: String },

    /// Topology store rejected a mutation
    #[error("Topology error: {message}")]
    Topology { message: String },

    /// An endpoint answered with an application error
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Error reported by a remote endpoint, preserved as text for diagnostics.
///
/// Remote errors are stored in published stats and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{cause}")]
pub struct RemoteError {
    pub cause: String,
}

impl RemoteError {
    pub fn new<S: Into<String>>(cause: S) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

impl From<io::Error> for RemoteError {
    fn from(err: io::Error) -> Self {
        RemoteError::new(err.to_string())
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::new(err.to_string())
    }
}

/// Result type alias for shardmon operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Convenience methods for creating specific error types
impl MonitorError {
    /// Create a snapshot error
    pub fn snapshot<S: Into<String>>(message: S) -> Self {
        MonitorError::Snapshot {
            message: message.into(),
        }
    }

    /// Create a topology error
    pub fn topology<S: Into<String>>(message: S) -> Self {
        MonitorError::Topology {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        MonitorError::Internal {
            message: message.into(),
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MonitorError::Config(_) => ErrorSeverity::Critical,
            MonitorError::Internal { .. } => ErrorSeverity::Critical,
            MonitorError::Snapshot { .. } => ErrorSeverity::Warning,
            MonitorError::Remote(_) => ErrorSeverity::Info,
            MonitorError::Topology { .. } | MonitorError::Http(_) => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about recoverable issues
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
