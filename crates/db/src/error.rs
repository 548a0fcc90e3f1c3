//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The record changed since it was read (optimistic concurrency).
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },

    /// Terminal execution logs are never patched again.
    #[error("execution log is already {0}")]
    TerminalStatus(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
