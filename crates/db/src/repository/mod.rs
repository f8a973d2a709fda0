//! Repository functions — one function per database operation.
//!
//! Workflow functions take the shared `&DbPool`. Execution and task functions
//! take a `&mut PgConnection` so they always run inside the caller's
//! transaction. No coordination logic, only SQL.

pub mod workflows;
pub mod executions;
pub mod tasks;
