//! Dispatch error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("cannot encode task message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The broker refused or could not be reached.
    #[error("queue '{queue}' unavailable: {message}")]
    Unavailable { queue: String, message: String },
}
