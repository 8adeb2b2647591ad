//! Error types for the CDMI server
//!
//! Provides structured error types for the object stores, the hierarchy
//! DAOs, the capability bridge, the QoS engine and the REST front end.

use thiserror::Error;

/// Unified error type for the server
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Object Store / Hierarchy Errors
    // =========================================================================
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Object already exists: {key}")]
    Conflict { key: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Malformed object: {0}")]
    Malformed(String),

    // =========================================================================
    // QoS Errors
    // =========================================================================
    #[error("Unsupported QoS transition for {path}: {current} -> {target}")]
    UnsupportedTransition {
        path: String,
        current: String,
        target: String,
    },

    #[error("QoS transition already in progress for {path} (target {target})")]
    TransitionInProgress { path: String, target: String },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Backend unavailable: {backend} - {reason}")]
    BackendUnavailable { backend: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by callers to translate errors into
/// protocol-level responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Path or identifier has no entry
    NotFound,
    /// Create on an occupied key, or an operation racing a pending one
    Conflict,
    /// Requested QoS profile is unreachable from the current one
    UnsupportedTransition,
    /// Storage backend could not be constructed or reached
    BackendUnavailable,
    /// Input or stored state cannot be parsed into the expected shape
    Malformed,
    /// Everything else
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,

            Error::Conflict { .. } | Error::TransitionInProgress { .. } => ErrorKind::Conflict,

            Error::UnsupportedTransition { .. } => ErrorKind::UnsupportedTransition,

            Error::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,

            Error::Malformed(_)
            | Error::InvalidPath { .. }
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorKind::Malformed,

            Error::Internal(_)
            | Error::Configuration(_)
            | Error::Metrics(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { .. } | Error::TransitionInProgress { .. }
        )
    }

    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound { key: key.into() }
    }

    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for the server
pub type Result<T> = std::result::Result<T, Error>;
