//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    /// A unique key already exists (e.g. a workflow name).
    #[error("row already exists: {0}")]
    AlreadyExists(String),

    /// A stored value could not be mapped back onto its model.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The store refused the operation (e.g. lost connection on commit).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
