//! Error types for mirror-sync.

use std::path::PathBuf;

use thiserror::Error;

use mirror_core::ConfigError;

/// Failures of the RPC transport or of the remote server itself.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request never produced a response (DNS, TLS, timeout, HTTP status).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with an error payload.
    #[error("server error: {message}")]
    Server {
        message: String,
        detail: Option<String>,
    },

    #[error("login rejected for user {username}")]
    LoginRejected { username: String },

    /// The server answered, but not with the shape the caller expected.
    #[error("unexpected response: {0}")]
    BadResponse(String),
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid configuration, detected at load or at connect time.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A remote call failed; aborts the current model's fetch only.
    #[error("{operation} on {model} failed for {connection}: {source}")]
    Remote {
        connection: String,
        model: String,
        operation: String,
        #[source]
        source: RpcError,
    },

    /// A relation field points at a remote model with no mapping.
    #[error("field {model}.{field} references unmapped model '{relation}'")]
    Resolution {
        model: String,
        field: String,
        relation: String,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (node store, fingerprints).
    #[error("node store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Remote failures are isolated to one model; everything else is fatal.
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Remote { .. })
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
