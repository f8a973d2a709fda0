//! The transactional execution-store contract.
//!
//! Every coordinator operation runs inside exactly one [`StoreTx`]. A
//! transaction that is dropped without [`StoreTx::commit`] discards its
//! writes, so release happens on every exit path, including early returns
//! and panics. Calling [`StoreTx::rollback`] is only needed to observe the
//! rollback outcome.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    DbError,
    models::{ExecutionRow, ExecutionState, NewTask, TaskRow, TaskState},
};

pub mod memory;
pub mod postgres;

/// Factory for transactions against the execution store.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DbError>;
}

/// One open transaction. All reads observe the transaction's own writes.
#[async_trait]
pub trait StoreTx: Send {
    /// Persist a new `RUNNING` execution.
    async fn create_execution(
        &mut self,
        workflow_name: &str,
        target_task: &str,
    ) -> Result<ExecutionRow, DbError>;

    /// Persist one `IDLE` task per entry, in order.
    async fn create_tasks(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
        tasks: &[NewTask],
    ) -> Result<Vec<TaskRow>, DbError>;

    async fn get_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<ExecutionRow, DbError>;

    /// Read an execution and hold its row lock until the transaction ends.
    /// Every writer of the execution's tasks takes this lock first.
    async fn lock_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<ExecutionRow, DbError>;

    /// All tasks of an execution in creation order.
    async fn list_tasks(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<Vec<TaskRow>, DbError>;

    /// Unconditionally overwrite a task's state and result.
    async fn update_task(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
        task_id: Uuid,
        state: TaskState,
        result: Option<serde_json::Value>,
    ) -> Result<TaskRow, DbError>;

    async fn update_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
        state: ExecutionState,
    ) -> Result<ExecutionRow, DbError>;

    /// Remove an execution together with all of its tasks.
    async fn delete_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<(), DbError>;

    /// Make every write of this transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    /// Discard every write of this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}
