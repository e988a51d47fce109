//! Storage error types.
//!
//! Every [`crate::MessageStore`] operation resolves with a value or one of these.

use thiserror::Error;

/// Errors that can occur when using message store operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("Mapping error: {0}")]
    Mapping(String),
    #[error("Message store is closed")]
    StoreClosed,
    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => StorageError::StoreClosed,
            other => StorageError::Database(other),
        }
    }
}

impl StorageError {
    /// True for the error every operation reports once the store has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, StorageError::StoreClosed)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
