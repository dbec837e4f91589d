//! Error types for federated service DNS
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for federated DNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for federated DNS reconciliation
#[derive(Error, Debug)]
pub enum Error {
    /// Topology lookup for a cluster that was never registered
    #[error("Unknown cluster: {0}")]
    UnknownCluster(String),

    /// The publishing DNS zone is absent from the backend
    #[error("DNS zone not found: {0}")]
    ZoneNotFound(String),

    /// The backend could not be reached or refused service
    #[error("DNS backend unavailable ({backend}): {message}")]
    BackendUnavailable {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// A single backend operation (list/create/remove) failed
    #[error("DNS backend operation {operation} failed ({backend}): {message}")]
    BackendOperationFailed {
        /// Backend name
        backend: String,
        /// Operation that failed
        operation: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File or socket I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an unknown cluster error
    pub fn unknown_cluster(cluster: impl Into<String>) -> Self {
        Self::UnknownCluster(cluster.into())
    }

    /// Create a zone-not-found error
    pub fn zone_not_found(zone: impl Into<String>) -> Self {
        Self::ZoneNotFound(zone.into())
    }

    /// Create a backend-unavailable error
    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a failed backend operation error
    pub fn backend_operation(
        backend: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BackendOperationFailed {
            backend: backend.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether re-invoking the failed call later may succeed
    ///
    /// Backend and zone failures are transient from the engine's point of
    /// view. Unknown clusters and bad input are caller errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ZoneNotFound(_)
            | Self::BackendUnavailable { .. }
            | Self::BackendOperationFailed { .. }
            | Self::Io(_) => true,
            Self::UnknownCluster(_)
            | Self::Config(_)
            | Self::InvalidInput(_)
            | Self::Json(_)
            | Self::Other(_) => false,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
