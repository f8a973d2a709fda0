//! Workflow execution coordinator.
//!
//! `WorkflowCoordinator` owns no execution state. Every call:
//! 1. Opens one store transaction.
//! 2. Re-reads whatever it needs inside that transaction.
//! 3. Runs the resolver over the snapshot and writes the decision.
//! 4. Commits and publishes the newly ready tasks (order per
//!    [`DispatchOrder`]).
//!
//! Any failure rolls the transaction back and surfaces as a single
//! [`EngineError`]. The store serialises conflicting writers; there is no
//! in-process lock, so several coordinators may share one store.

use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use db::{ExecutionStore, NewTask, StoreTx, TaskRow};
use queue::{TaskDispatcher, TaskMessage};

use crate::config::{CoordinatorConfig, DispatchOrder, TransitionPolicy};
use crate::dag::find_workflow_tasks;
use crate::definitions::DefinitionStore;
use crate::error::{DefinitionError, EngineError, Operation};
use crate::models::{Execution, ExecutionState, Target, Task, TaskState, WorkflowDefinition};
use crate::resolver::{self, Outcome};

/// An execution together with its tasks and current outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionView {
    pub execution: Execution,
    pub tasks: Vec<Task>,
    pub outcome: Outcome,
}

/// How to take back a dispatch that could not be published after commit.
enum Undo {
    /// Drop the freshly created execution.
    DeleteExecution { workflow_name: String, execution_id: Uuid },
    /// Return tasks that were marked `RUNNING` for this dispatch to `IDLE`.
    ReleaseTasks { workflow_name: String, execution_id: Uuid, task_ids: Vec<Uuid> },
}

pub struct WorkflowCoordinator {
    store: Arc<dyn ExecutionStore>,
    definitions: Arc<dyn DefinitionStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    config: CoordinatorConfig,
}

impl WorkflowCoordinator {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        definitions: Arc<dyn DefinitionStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        config: CoordinatorConfig,
    ) -> Self {
        Self { store, definitions, dispatcher, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn definitions(&self) -> &Arc<dyn DefinitionStore> {
        &self.definitions
    }

    /// Create an execution of `workflow_name` aimed at `target_task` and
    /// dispatch its initial frontier.
    ///
    /// Only the target's dependency closure is instantiated. `"*"` targets the
    /// whole definition.
    ///
    /// # Errors
    /// One [`EngineError`] for any failure; nothing of the execution remains
    /// visible afterwards.
    #[instrument(skip(self))]
    pub async fn start_execution(
        &self,
        workflow_name: &str,
        target_task: &str,
    ) -> Result<Execution, EngineError> {
        let op = Operation::StartExecution;

        let definition = self
            .definitions
            .get(workflow_name)
            .await
            .with_context(|| format!("cannot load workflow '{workflow_name}'"))
            .map_err(|cause| fail(op, cause))?;

        let target = Target::from(target_task);
        let new_tasks: Vec<NewTask> = find_workflow_tasks(&definition, &target)
            .context("cannot resolve target task")
            .map_err(|cause| fail(op, cause))?
            .into_iter()
            .map(|spec| NewTask::new(spec.name.as_str()))
            .collect();

        let mut tx = self
            .store
            .begin()
            .await
            .context("cannot open transaction")
            .map_err(|cause| fail(op, cause))?;

        let decided = self
            .create_in_tx(tx.as_mut(), workflow_name, &target, &definition, &new_tasks)
            .await;
        let (execution, dispatch) = match decided {
            Ok(decided) => decided,
            Err(cause) => return Err(abort(op, tx, cause).await),
        };

        let undo = Undo::DeleteExecution {
            workflow_name: workflow_name.to_owned(),
            execution_id: execution.id,
        };
        self.finish(tx, &dispatch, undo)
            .await
            .map_err(|cause| fail(op, cause))?;

        info!(
            execution_id = %execution.id,
            tasks = new_tasks.len(),
            dispatched = dispatch.len(),
            "Execution created"
        );
        Ok(execution)
    }

    /// Record an executor's result for one task, then either finish the
    /// execution or dispatch whatever became ready.
    ///
    /// Re-conveying a task's current state is accepted and simply re-evaluates
    /// the execution.
    ///
    /// # Errors
    /// One [`EngineError`] for any failure; the previous state stays visible.
    #[instrument(skip(self, result))]
    pub async fn convey_task_result(
        &self,
        workflow_name: &str,
        execution_id: Uuid,
        task_id: Uuid,
        state: TaskState,
        result: Option<serde_json::Value>,
    ) -> Result<Task, EngineError> {
        let op = Operation::ConveyTaskResult;

        let mut tx = self
            .store
            .begin()
            .await
            .context("cannot open transaction")
            .map_err(|cause| fail(op, cause))?;

        let decided = self
            .convey_in_tx(tx.as_mut(), workflow_name, execution_id, task_id, state, result)
            .await;
        let (task, dispatch) = match decided {
            Ok(decided) => decided,
            Err(cause) => return Err(abort(op, tx, cause).await),
        };

        let undo = Undo::ReleaseTasks {
            workflow_name: workflow_name.to_owned(),
            execution_id,
            task_ids: dispatch.iter().map(|m| m.task_id).collect(),
        };
        self.finish(tx, &dispatch, undo)
            .await
            .map_err(|cause| fail(op, cause))?;

        Ok(task)
    }

    /// Read an execution, its tasks and its current outcome. Writes nothing.
    #[instrument(skip(self))]
    pub async fn get_execution(
        &self,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> Result<ExecutionView, EngineError> {
        let op = Operation::ReadExecution;

        let mut tx = self
            .store
            .begin()
            .await
            .context("cannot open transaction")
            .map_err(|cause| fail(op, cause))?;

        let view = self.read_in_tx(tx.as_mut(), workflow_name, execution_id).await;
        // Read-only: nothing to commit.
        if let Err(err) = tx.rollback().await {
            warn!(error = %err, "read transaction did not close cleanly");
        }
        view.map_err(|cause| fail(op, cause))
    }

    // -----------------------------------------------------------------------
    // Transaction bodies
    // -----------------------------------------------------------------------

    async fn create_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        workflow_name: &str,
        target: &Target,
        definition: &WorkflowDefinition,
        new_tasks: &[NewTask],
    ) -> anyhow::Result<(Execution, Vec<TaskMessage>)> {
        let row = tx
            .create_execution(workflow_name, &target.to_string())
            .await
            .context("cannot persist execution")?;
        let rows = tx
            .create_tasks(workflow_name, row.id, new_tasks)
            .await
            .context("cannot persist tasks")?;

        let tasks = join_tasks(rows, definition)?;
        let dispatch = self.claim_frontier(tx, &tasks).await?;

        Ok((Execution::from(row), dispatch))
    }

    async fn convey_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        workflow_name: &str,
        execution_id: Uuid,
        task_id: Uuid,
        state: TaskState,
        result: Option<serde_json::Value>,
    ) -> anyhow::Result<(Task, Vec<TaskMessage>)> {
        // Held until commit: reports for this execution are applied one at a
        // time, including the transition check below.
        let execution = Execution::from(
            tx.lock_execution(workflow_name, execution_id)
                .await
                .context("cannot read execution")?,
        );

        if self.config.transitions == TransitionPolicy::Strict {
            let current = tx
                .list_tasks(workflow_name, execution_id)
                .await
                .context("cannot read tasks")?
                .into_iter()
                .find(|t| t.id == task_id)
                .ok_or_else(|| anyhow!("task {task_id} not found"))?;
            if !self.config.transitions.allows(current.state, state) {
                bail!("task {task_id} cannot move from {} to {state}", current.state);
            }
        }

        tx.update_task(workflow_name, execution_id, task_id, state, result)
            .await
            .with_context(|| format!("cannot update task {task_id}"))?;

        let definition = self
            .definitions
            .get(workflow_name)
            .await
            .with_context(|| format!("cannot load workflow '{workflow_name}'"))?;
        let tasks = join_tasks(
            tx.list_tasks(workflow_name, execution_id)
                .await
                .context("cannot read tasks")?,
            &definition,
        )?;

        let task = tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .ok_or_else(|| anyhow!("task {task_id} vanished after update"))?;

        // A finished execution keeps its state; late reports are recorded only.
        if execution.state.is_terminal() {
            info!(
                execution_id = %execution_id,
                state = %execution.state,
                "Result recorded for finished execution"
            );
            return Ok((task, Vec::new()));
        }

        // Target check first: a finished target ends the execution even while
        // siblings are still out.
        let outcome =
            resolver::target_outcome(&tasks, &execution.target(), self.config.failure_propagation);
        if outcome != Outcome::Incomplete {
            if self.config.finalize_on_target {
                self.finalize(tx, &execution, outcome, &tasks).await?;
            }
            info!(execution_id = %execution_id, %outcome, "Execution finished on target task");
            return Ok((task, Vec::new()));
        }

        if resolver::is_success(&tasks) {
            tx.update_execution(workflow_name, execution_id, ExecutionState::Success)
                .await
                .context("cannot update execution")?;
            info!(execution_id = %execution_id, "Execution finished with success");
            return Ok((task, Vec::new()));
        }

        let dispatch = self.claim_frontier(tx, &tasks).await?;
        Ok((task, dispatch))
    }

    async fn read_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        workflow_name: &str,
        execution_id: Uuid,
    ) -> anyhow::Result<ExecutionView> {
        let execution = Execution::from(tx.get_execution(workflow_name, execution_id).await?);
        let definition = self.definitions.get(workflow_name).await?;
        let tasks = join_tasks(tx.list_tasks(workflow_name, execution_id).await?, &definition)?;
        let outcome = resolver::is_execution_complete(
            &tasks,
            &execution.target(),
            self.config.failure_propagation,
        );
        Ok(ExecutionView { execution, tasks, outcome })
    }

    /// Move every ready task to `RUNNING` and build its dispatch message.
    async fn claim_frontier(
        &self,
        tx: &mut dyn StoreTx,
        tasks: &[Task],
    ) -> anyhow::Result<Vec<TaskMessage>> {
        let ready = resolver::ready_tasks(tasks);
        let mut messages = Vec::with_capacity(ready.len());

        for task in ready {
            tx.update_task(
                &task.workflow_name,
                task.execution_id,
                task.id,
                TaskState::Running,
                task.result.clone(),
            )
            .await
            .with_context(|| format!("cannot mark task '{}' running", task.name))?;
            messages.push(task.to_message());
        }
        Ok(messages)
    }

    /// Write the execution's terminal state for a decided target.
    async fn finalize(
        &self,
        tx: &mut dyn StoreTx,
        execution: &Execution,
        outcome: Outcome,
        tasks: &[Task],
    ) -> anyhow::Result<()> {
        let state = match outcome {
            Outcome::Failed => ExecutionState::Error,
            // SUCCESS always means every task succeeded.
            Outcome::Succeeded if resolver::is_success(tasks) => ExecutionState::Success,
            _ => return Ok(()),
        };
        if execution.state == state {
            return Ok(());
        }
        tx.update_execution(&execution.workflow_name, execution.id, state)
            .await
            .context("cannot update execution")?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commit + dispatch
    // -----------------------------------------------------------------------

    async fn finish(
        &self,
        tx: Box<dyn StoreTx>,
        dispatch: &[TaskMessage],
        undo: Undo,
    ) -> anyhow::Result<()> {
        match self.config.dispatch_order {
            DispatchOrder::BeforeCommit => {
                if let Err(err) = self.dispatcher.dispatch(dispatch).await {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "rollback after failed dispatch did not complete");
                    }
                    return Err(anyhow::Error::new(err).context("cannot dispatch ready tasks"));
                }
                // Messages are already out; a failed commit here leaves
                // executors holding tasks whose state was rolled back.
                tx.commit().await.context("cannot commit transaction")?;
            }
            DispatchOrder::AfterCommit => {
                tx.commit().await.context("cannot commit transaction")?;
                if let Err(err) = self.dispatcher.dispatch(dispatch).await {
                    self.compensate(undo).await;
                    return Err(anyhow::Error::new(err).context("cannot dispatch ready tasks"));
                }
            }
        }
        Ok(())
    }

    /// Best effort: failures are logged, the original error is what the
    /// caller sees.
    async fn compensate(&self, undo: Undo) {
        let outcome = async {
            let mut tx = self.store.begin().await?;
            match &undo {
                Undo::DeleteExecution { workflow_name, execution_id } => {
                    tx.delete_execution(workflow_name, *execution_id).await?;
                    warn!(execution_id = %execution_id, "Dispatch failed, execution removed");
                }
                Undo::ReleaseTasks { workflow_name, execution_id, task_ids } => {
                    for task in tx.list_tasks(workflow_name, *execution_id).await? {
                        if !task_ids.contains(&task.id)
                            || task.state != TaskState::Running
                            || task.result.is_some()
                        {
                            continue;
                        }
                        tx.update_task(workflow_name, *execution_id, task.id, TaskState::Idle, None)
                            .await?;
                        warn!(task_id = %task.id, task = %task.name, "Dispatch failed, task released");
                    }
                }
            }
            tx.commit().await
        }
        .await;

        if let Err(err) = outcome {
            error!(error = %err, "cannot undo failed dispatch");
        }
    }
}

/// Join task rows with the specs they were created from.
fn join_tasks(rows: Vec<TaskRow>, definition: &WorkflowDefinition) -> anyhow::Result<Vec<Task>> {
    rows.into_iter()
        .map(|row| -> anyhow::Result<Task> {
            let spec = definition
                .task(&row.name)
                .ok_or_else(|| DefinitionError::UnknownTask(row.name.clone()))?;
            Ok(Task::from_row(row, spec))
        })
        .collect()
}

fn fail(op: Operation, cause: anyhow::Error) -> EngineError {
    error!(operation = %op, error = %format!("{cause:#}"), "coordinator operation failed");
    EngineError::new(op, cause)
}

async fn abort(op: Operation, tx: Box<dyn StoreTx>, cause: anyhow::Error) -> EngineError {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "rollback did not complete; dropping transaction");
    }
    fail(op, cause)
}
