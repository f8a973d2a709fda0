//! In-process execution store.
//!
//! A transaction takes the store-wide lock for its whole lifetime and works
//! on a private copy of the data; `commit` swaps the copy in. Transactions are
//! therefore fully serialised. Used by tests and by `serve` without a
//! database.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::{
    DbError,
    models::{ExecutionRow, ExecutionState, NewTask, TaskRow, TaskState},
    store::{ExecutionStore, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    executions: Vec<ExecutionRow>,
    tasks: Vec<TaskRow>,
}

impl MemoryState {
    fn execution_mut(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<&mut ExecutionRow, DbError> {
        self.executions
            .iter_mut()
            .find(|e| e.id == execution_id && e.workflow_name == workflow_name)
            .ok_or(DbError::NotFound)
    }
}

/// [`ExecutionStore`] kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `commit` fail (and discard the writes) for transactions begun from
    /// now on.
    pub fn set_commit_failure(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Committed executions, in creation order.
    pub async fn executions(&self) -> Vec<ExecutionRow> {
        self.state.lock().await.executions.clone()
    }

    /// Committed tasks of one execution, in creation order.
    pub async fn tasks(&self, execution_id: Uuid) -> Vec<TaskRow> {
        self.state
            .lock()
            .await
            .tasks
            .iter()
            .filter(|t| t.execution_id == execution_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DbError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }
}

/// Open in-memory transaction. Dropping it releases the lock and discards
/// the working copy.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: bool,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn create_execution(
        &mut self,
        workflow_name: &str,
        target_task: &str,
    ) -> Result<ExecutionRow, DbError> {
        let now = Utc::now();
        let row = ExecutionRow {
            id: Uuid::new_v4(),
            workflow_name: workflow_name.to_owned(),
            target_task: target_task.to_owned(),
            state: ExecutionState::Running,
            created_at: now,
            updated_at: now,
        };
        self.working.executions.push(row.clone());
        Ok(row)
    }

    async fn create_tasks(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
        tasks: &[NewTask],
    ) -> Result<Vec<TaskRow>, DbError> {
        self.working.execution_mut(workflow_name, execution_id)?;

        let now = Utc::now();
        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let exists = self
                .working
                .tasks
                .iter()
                .any(|t| t.execution_id == execution_id && t.name == task.name);
            if exists {
                return Err(DbError::AlreadyExists(task.name.clone()));
            }

            let row = TaskRow {
                id: Uuid::new_v4(),
                execution_id,
                workflow_name: workflow_name.to_owned(),
                name: task.name.clone(),
                state: TaskState::Idle,
                result: None,
                created_at: now,
                updated_at: now,
            };
            self.working.tasks.push(row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    async fn get_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<ExecutionRow, DbError> {
        self.working
            .execution_mut(workflow_name, execution_id)
            .map(|e| e.clone())
    }

    async fn lock_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<ExecutionRow, DbError> {
        // The whole store is already held by this transaction.
        self.get_execution(workflow_name, execution_id).await
    }

    async fn list_tasks(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<Vec<TaskRow>, DbError> {
        Ok(self
            .working
            .tasks
            .iter()
            .filter(|t| t.execution_id == execution_id && t.workflow_name == workflow_name)
            .cloned()
            .collect())
    }

    async fn update_task(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
        task_id: Uuid,
        state: TaskState,
        result: Option<serde_json::Value>,
    ) -> Result<TaskRow, DbError> {
        let task = self
            .working
            .tasks
            .iter_mut()
            .find(|t| {
                t.id == task_id && t.execution_id == execution_id && t.workflow_name == workflow_name
            })
            .ok_or(DbError::NotFound)?;

        task.state = state;
        task.result = result;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn update_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
        state: ExecutionState,
    ) -> Result<ExecutionRow, DbError> {
        let execution = self.working.execution_mut(workflow_name, execution_id)?;
        execution.state = state;
        execution.updated_at = Utc::now();
        Ok(execution.clone())
    }

    async fn delete_execution(
        &mut self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<(), DbError> {
        self.working.execution_mut(workflow_name, execution_id)?;
        self.working.executions.retain(|e| e.id != execution_id);
        self.working.tasks.retain(|t| t.execution_id != execution_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        if self.fail_commit {
            return Err(DbError::Unavailable("commit rejected".into()));
        }
        let MemoryTx { mut guard, working, .. } = *self;
        *guard = working;
        debug!("memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        debug!("memory transaction rolled back");
        Ok(())
    }
}
