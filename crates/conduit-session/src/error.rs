//! Session-specific error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Stream not found: {id}")]
    StreamNotFound { id: Uuid },

    #[error("Session '{key}' was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
