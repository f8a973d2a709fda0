//! Postgres-backed execution store.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::{
    DbError, DbPool,
    models::{ExecutionRow, ExecutionState, NewTask, TaskRow, TaskState},
    repository::{executions, tasks},
    store::{ExecutionStore, StoreTx},
};

/// [`ExecutionStore`] over a shared Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DbError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

/// A `sqlx` transaction. Dropping it uncommitted rolls it back when the
/// connection returns to the pool.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn create_execution(
        &mut self,
        workflow_name: &str,
        target_task: &str,
    ) -> Result<ExecutionRow, DbError> {
        executions::create_execution(&mut self.tx, workflow_name, target_task).await
    }

    async fn create_tasks(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
        new_tasks: &[NewTask],
    ) -> Result<Vec<TaskRow>, DbError> {
        tasks::create_tasks(&mut self.tx, workflow_name, execution_id, new_tasks).await
    }

    async fn get_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<ExecutionRow, DbError> {
        executions::get_execution(&mut self.tx, workflow_name, execution_id, false).await
    }

    async fn lock_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<ExecutionRow, DbError> {
        executions::get_execution(&mut self.tx, workflow_name, execution_id, true).await
    }

    async fn list_tasks(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<Vec<TaskRow>, DbError> {
        tasks::list_tasks(&mut self.tx, workflow_name, execution_id).await
    }

    async fn update_task(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
        task_id: Uuid,
        state: TaskState,
        result: Option<serde_json::Value>,
    ) -> Result<TaskRow, DbError> {
        // Lock order: execution row, then task row. Concurrent results for
        // sibling tasks queue up here instead of each missing the other's
        // write when the frontier is recomputed. Re-locking within the same
        // transaction is a no-op.
        self.lock_execution(workflow_name, execution_id).await?;
        tasks::update_task(&mut self.tx, workflow_name, execution_id, task_id, state, result).await
    }

    async fn update_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
        state: ExecutionState,
    ) -> Result<ExecutionRow, DbError> {
        executions::update_execution_state(&mut self.tx, workflow_name, execution_id, state).await
    }

    async fn delete_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<(), DbError> {
        executions::delete_execution(&mut self.tx, workflow_name, execution_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.tx.commit().await?;
        debug!("transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.tx.rollback().await?;
        debug!("transaction rolled back");
        Ok(())
    }
}
