//! Error types for agora.
//!
//! A single error type with explicit variants for transport, authentication,
//! protocol, input validation, local storage and offline failures.

use std::fmt;
use thiserror::Error;

/// The unified error type for agora operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network transport errors (connection, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication errors (missing or rejected credentials).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Error responses from the backend.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Input validation errors (collection names, record payloads, filters).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    /// Local persistence errors.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The operation needs connectivity that is not available.
    #[error("offline: {0}")]
    Offline(#[from] OfflineError),
}

impl Error {
    /// Whether retrying the same request later could succeed.
    ///
    /// Transport failures, 5xx responses and rate limiting are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Protocol(err) => err.status >= 500 || err.status == 429,
            _ => false,
        }
    }
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// TLS error.
    #[error("TLS error: {message}")]
    Tls { message: String },

    /// Request timed out.
    #[error("request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The backend rejected the API key or access token.
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// No API key was configured.
    #[error("missing API key")]
    MissingApiKey,
}

/// Error responses returned by the backend.
#[derive(Debug)]
pub struct ProtocolError {
    /// HTTP status code.
    pub status: u16,
    /// Backend error code (if present).
    pub code: Option<String>,
    /// Error message from the backend.
    pub message: Option<String>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    /// Create a new protocol error.
    pub fn new(status: u16, code: Option<String>, message: Option<String>) -> Self {
        Self {
            status,
            code,
            message,
        }
    }

    /// A 404 for a missing row.
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(404, Some("NotFound".to_string()), Some(format!("{} not found", what)))
    }

    /// Check if this is a missing-row error.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid collection name.
    #[error("invalid collection '{value}': {reason}")]
    Collection { value: String, reason: String },

    /// Invalid record identifier.
    #[error("invalid record id: {reason}")]
    RecordId { reason: String },

    /// Invalid record payload.
    #[error("invalid record: {reason}")]
    Record { reason: String },

    /// Invalid service URL.
    #[error("invalid service URL '{value}': {reason}")]
    ServiceUrl { value: String, reason: String },

    /// Invalid filter expression.
    #[error("invalid filter '{value}': {reason}")]
    Filter { value: String, reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}

/// Local persistence errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("IO error at {path}: {message}")]
    Io { path: String, message: String },

    /// A persisted blob could not be encoded or decoded.
    #[error("serialization failed: {message}")]
    Serialization { message: String },
}

impl StorageError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Failures caused by missing connectivity.
#[derive(Debug, Error)]
pub enum OfflineError {
    /// Offline and nothing cached for the requested read.
    #[error("no offline snapshot for '{key}'")]
    NoSnapshot { key: String },

    /// The offline queue reached its configured bound.
    #[error("offline queue is full ({limit} actions)")]
    QueueFull { limit: usize },
}
