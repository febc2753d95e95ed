//! Error types for outpost-core

use thiserror::Error;

use crate::models::SyncRecord;

/// Result type alias using outpost-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in outpost-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed change or request shape
    #[error("Validation error: {0}")]
    Validation(String),

    /// The stored record has moved on; carries the current server version
    #[error("Conflict on {}/{}", .0.table_name, .0.record_id)]
    Conflict(Box<SyncRecord>),

    /// Record (or pending conflict) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record store adapter failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a blind retry of the same call is safe and may succeed.
    ///
    /// Storage-class failures are retryable: re-submitting an already applied
    /// change with the same clock is an idempotent no-op.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Database(_) | Self::LibSql(_) | Self::Io(_)
        )
    }
}
