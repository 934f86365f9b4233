//! Persistence errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be decoded into a snapshot or journal entry.
    #[error("corrupt record: {0}")]
    InvalidData(String),

    #[error("schema migration failed: {0}")]
    Migration(String),

    /// The blocking task running a SQLite call panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),

    #[error("memory store lock poisoned")]
    Poisoned,
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
