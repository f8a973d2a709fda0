//! `queue` crate — the dispatch channel towards task executors.
//!
//! The coordinator publishes one [`TaskMessage`] per ready task through a
//! [`TaskDispatcher`]. Delivery is at-least-once: executors deduplicate on
//! `task_id`.

pub mod error;
pub mod message;
pub mod dispatcher;
pub mod postgres;
pub mod memory;

pub use error::QueueError;
pub use message::TaskMessage;
pub use dispatcher::TaskDispatcher;
pub use postgres::PgTaskQueue;
pub use memory::MemoryQueue;

/// Queue name used when none is configured.
pub const DEFAULT_QUEUE: &str = "tasks";
