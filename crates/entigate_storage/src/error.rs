//! Error types for record store operations.

use thiserror::Error;

/// Result type for record store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store is unreachable or failed an operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A put carried a record whose id does not match the target resource.
    #[error("record id mismatch: writing {record} under {target}")]
    IdMismatch {
        /// The resource being written.
        target: String,
        /// The id carried by the record.
        record: String,
    },

    /// The stored data is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
