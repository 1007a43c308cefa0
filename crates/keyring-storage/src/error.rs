//! Storage error types

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Value could not be encoded or decoded by the backend
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend I/O failure (including injected faults)
    #[error("I/O error: {0}")]
    Io(String),

    /// The caller's cancellation token fired before the call
    #[error("storage operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
