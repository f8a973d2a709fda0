//! `db` crate — the execution store.
//!
//! Provides typed row structs, the transactional [`ExecutionStore`] contract
//! with an in-memory and a Postgres implementation, the workflow-definition
//! repository, and pool/migration helpers. No coordination logic lives here.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use models::{ExecutionRow, ExecutionState, NewTask, TaskRow, TaskState, WorkflowRow};
pub use pool::DbPool;
pub use store::{ExecutionStore, StoreTx};
pub use store::memory::MemoryStore;
pub use store::postgres::PgStore;
