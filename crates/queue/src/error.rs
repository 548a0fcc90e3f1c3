//! Typed error type for the queue crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The consumer side of the delivery channel is gone.
    #[error("continuation channel closed")]
    ChannelClosed,
}
