//! Storage traits and error types
//!
//! This module defines the persistence contract consumed by the record
//! batcher and the errors a sink can report.

use crate::record::Record;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid identifier '{0}': expected letters, digits and underscores")]
    InvalidIdentifier(String),

    #[error("Unsupported database URL: {0}")]
    UnsupportedUrl(String),

    #[error("Sink rejected batch for {destination}: {message}")]
    Rejected {
        destination: String,
        message: String,
    },

    #[error("Storage task failed: {0}")]
    Join(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for batches of records
///
/// Implementations must write a batch all-or-nothing: either every record
/// is appended, or an error is returned and nothing is.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Appends records to the named destination
    ///
    /// # Arguments
    ///
    /// * `destination` - Table or collection name
    /// * `records` - Records in the order they were produced
    ///
    /// # Returns
    ///
    /// The number of records written
    async fn append_batch(&self, destination: &str, records: &[Record]) -> StorageResult<usize>;
}
