//! The `TaskDispatcher` trait, the contract every dispatch channel fulfils.

use async_trait::async_trait;

use crate::{QueueError, TaskMessage};

#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Publish a batch of ready-task notifications.
    ///
    /// Returns once the channel has accepted every message; it never waits
    /// for an executor to consume them. An empty batch is a no-op.
    async fn dispatch(&self, messages: &[TaskMessage]) -> Result<(), QueueError>;
}
