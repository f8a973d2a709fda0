//! Coordinator tests against the in-memory store, definitions and queue.
//!
//! No Postgres is needed: `MemoryStore` gives the same transactional
//! contract as `PgStore`, and `MemoryQueue` records what was dispatched.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use db::{ExecutionState, MemoryStore, TaskState};
use queue::MemoryQueue;

use crate::config::{CoordinatorConfig, DispatchOrder, FailurePropagation, TransitionPolicy};
use crate::coordinator::WorkflowCoordinator;
use crate::definitions::{DefinitionStore, MemoryDefinitions};
use crate::error::Operation;
use crate::models::{TaskSpec, WorkflowDefinition};
use crate::resolver::Outcome;

const WF: &str = "wb";

struct Harness {
    store: MemoryStore,
    queue: MemoryQueue,
    definitions: MemoryDefinitions,
    coordinator: Arc<WorkflowCoordinator>,
}

impl Harness {
    async fn new(config: CoordinatorConfig) -> Self {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();
        let definitions = MemoryDefinitions::new();
        definitions.create(diamond()).await.unwrap();

        let coordinator = Arc::new(WorkflowCoordinator::new(
            Arc::new(store.clone()),
            Arc::new(definitions.clone()),
            Arc::new(queue.clone()),
            config,
        ));
        Self { store, queue, definitions, coordinator }
    }

    /// Names of everything dispatched since the last call.
    fn dispatched(&self) -> Vec<String> {
        self.queue.drain().into_iter().map(|m| m.task_name).collect()
    }

    async fn task_id(&self, execution_id: Uuid, name: &str) -> Uuid {
        self.store
            .tasks(execution_id)
            .await
            .into_iter()
            .find(|t| t.name == name)
            .map(|t| t.id)
            .unwrap_or_else(|| panic!("task {name} not instantiated"))
    }

    async fn state_of(&self, execution_id: Uuid, name: &str) -> TaskState {
        self.store
            .tasks(execution_id)
            .await
            .into_iter()
            .find(|t| t.name == name)
            .map(|t| t.state)
            .unwrap_or_else(|| panic!("task {name} not instantiated"))
    }

    async fn execution_state(&self, execution_id: Uuid) -> ExecutionState {
        self.store
            .executions()
            .await
            .into_iter()
            .find(|e| e.id == execution_id)
            .map(|e| e.state)
            .unwrap_or_else(|| panic!("execution {execution_id} missing"))
    }

    async fn convey(
        &self,
        execution_id: Uuid,
        name: &str,
        state: TaskState,
    ) -> Result<crate::models::Task, crate::error::EngineError> {
        let task_id = self.task_id(execution_id, name).await;
        self.coordinator
            .convey_task_result(WF, execution_id, task_id, state, Some(json!({ "by": name })))
            .await
    }
}

/// `c` requires `a` and `b`; `d` stands alone.
fn diamond() -> WorkflowDefinition {
    WorkflowDefinition::new(
        WF,
        vec![
            TaskSpec::new("a").with_action("fetch"),
            TaskSpec::new("b"),
            TaskSpec::new("c").requires(["a", "b"]).with_parameters(json!({ "retries": 2 })),
            TaskSpec::new("d"),
        ],
    )
}

// ============================================================
// Dependency-driven dispatch
// ============================================================

#[tokio::test]
async fn diamond_runs_to_success() {
    let h = Harness::new(CoordinatorConfig::default()).await;

    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    assert_eq!(execution.state, ExecutionState::Running);
    assert_eq!(h.dispatched(), vec!["a", "b"]);

    h.convey(execution.id, "a", TaskState::Success).await.unwrap();
    assert!(h.dispatched().is_empty());

    h.convey(execution.id, "b", TaskState::Success).await.unwrap();
    assert_eq!(h.dispatched(), vec!["c"]);
    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Running);

    h.convey(execution.id, "c", TaskState::Success).await.unwrap();
    assert!(h.dispatched().is_empty());
    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Success);

    let view = h.coordinator.get_execution(WF, execution.id).await.unwrap();
    assert_eq!(view.outcome, Outcome::Succeeded);
    assert_eq!(view.tasks.len(), 3);
}

#[tokio::test]
async fn only_the_target_closure_is_instantiated() {
    let h = Harness::new(CoordinatorConfig::default()).await;

    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();

    let names: Vec<String> =
        h.store.tasks(execution.id).await.into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(h.state_of(execution.id, "a").await, TaskState::Running);
    assert_eq!(h.state_of(execution.id, "b").await, TaskState::Running);
    assert_eq!(h.state_of(execution.id, "c").await, TaskState::Idle);
}

#[tokio::test]
async fn root_target_dispatches_only_itself() {
    let h = Harness::new(CoordinatorConfig::default()).await;

    let execution = h.coordinator.start_execution(WF, "a").await.unwrap();
    assert_eq!(h.dispatched(), vec!["a"]);

    h.convey(execution.id, "a", TaskState::Success).await.unwrap();
    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Success);
}

#[tokio::test]
async fn wildcard_target_takes_the_whole_definition() {
    let h = Harness::new(CoordinatorConfig::default()).await;

    let execution = h.coordinator.start_execution(WF, "*").await.unwrap();
    assert_eq!(execution.target_task, "*");
    assert_eq!(h.store.tasks(execution.id).await.len(), 4);
    assert_eq!(h.dispatched(), vec!["a", "b", "d"]);

    for name in ["a", "b"] {
        h.convey(execution.id, name, TaskState::Success).await.unwrap();
    }
    assert_eq!(h.dispatched(), vec!["c"]);

    for name in ["c", "d"] {
        h.convey(execution.id, name, TaskState::Success).await.unwrap();
    }
    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Success);
}

#[tokio::test]
async fn dispatched_messages_carry_the_task_spec() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();

    let first = h.queue.drain();
    assert_eq!(first[0].action.as_deref(), Some("fetch"));
    assert_eq!(first[0].execution_id, execution.id);

    h.convey(execution.id, "a", TaskState::Success).await.unwrap();
    h.convey(execution.id, "b", TaskState::Success).await.unwrap();
    let next = h.queue.drain();
    assert_eq!(next[0].task_name, "c");
    assert_eq!(next[0].parameters, json!({ "retries": 2 }));
}

#[tokio::test]
async fn reasserting_a_result_does_not_redispatch() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    h.dispatched();

    h.convey(execution.id, "a", TaskState::Success).await.unwrap();
    h.convey(execution.id, "b", TaskState::Success).await.unwrap();
    assert_eq!(h.dispatched(), vec!["c"]);

    let task = h.convey(execution.id, "b", TaskState::Success).await.unwrap();
    assert_eq!(task.state, TaskState::Success);
    assert_eq!(task.result, Some(json!({ "by": "b" })));
    assert!(h.dispatched().is_empty());
    assert_eq!(h.state_of(execution.id, "c").await, TaskState::Running);
}

#[tokio::test]
async fn concurrent_sibling_results_dispatch_the_dependant_once() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    h.dispatched();

    let a = h.task_id(execution.id, "a").await;
    let b = h.task_id(execution.id, "b").await;

    let handles: Vec<_> = [a, b]
        .into_iter()
        .map(|task_id| {
            let coordinator = Arc::clone(&h.coordinator);
            let execution_id = execution.id;
            tokio::spawn(async move {
                coordinator
                    .convey_task_result(WF, execution_id, task_id, TaskState::Success, None)
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.dispatched(), vec!["c"]);
    assert_eq!(h.state_of(execution.id, "c").await, TaskState::Running);
}

// ============================================================
// Failure handling
// ============================================================

#[tokio::test]
async fn dependency_error_stalls_under_target_only() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    h.dispatched();

    h.convey(execution.id, "a", TaskState::Error).await.unwrap();
    h.convey(execution.id, "b", TaskState::Success).await.unwrap();

    assert!(h.dispatched().is_empty());
    assert_eq!(h.state_of(execution.id, "c").await, TaskState::Idle);
    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Running);

    let view = h.coordinator.get_execution(WF, execution.id).await.unwrap();
    assert_eq!(view.outcome, Outcome::Incomplete);
}

#[tokio::test]
async fn dependency_error_fails_when_contagious() {
    let config = CoordinatorConfig {
        failure_propagation: FailurePropagation::Contagious,
        ..CoordinatorConfig::default()
    };
    let h = Harness::new(config).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();

    h.convey(execution.id, "a", TaskState::Error).await.unwrap();

    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Error);
    let view = h.coordinator.get_execution(WF, execution.id).await.unwrap();
    assert_eq!(view.outcome, Outcome::Failed);
}

#[tokio::test]
async fn failed_target_ends_the_execution_with_error() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    h.dispatched();

    h.convey(execution.id, "c", TaskState::Error).await.unwrap();

    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Error);
    assert!(h.dispatched().is_empty());
}

#[tokio::test]
async fn early_target_success_is_not_written_while_siblings_run() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();

    h.convey(execution.id, "c", TaskState::Success).await.unwrap();

    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Running);
    let view = h.coordinator.get_execution(WF, execution.id).await.unwrap();
    assert_eq!(view.outcome, Outcome::Succeeded);
}

#[tokio::test]
async fn reference_mode_leaves_the_execution_state_alone() {
    let h = Harness::new(CoordinatorConfig::reference()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();

    h.convey(execution.id, "c", TaskState::Error).await.unwrap();

    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Running);
    let view = h.coordinator.get_execution(WF, execution.id).await.unwrap();
    assert_eq!(view.outcome, Outcome::Failed);
}

#[tokio::test]
async fn strict_transitions_reject_skipping_running() {
    let config = CoordinatorConfig {
        transitions: TransitionPolicy::Strict,
        ..CoordinatorConfig::default()
    };
    let h = Harness::new(config).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();

    h.convey(execution.id, "a", TaskState::Success).await.unwrap();
    h.convey(execution.id, "a", TaskState::Success).await.unwrap();

    let err = h.convey(execution.id, "c", TaskState::Success).await.unwrap_err();
    assert_eq!(err.operation(), Operation::ConveyTaskResult);
    assert_eq!(h.state_of(execution.id, "c").await, TaskState::Idle);

    let err = h.convey(execution.id, "a", TaskState::Error).await.unwrap_err();
    assert_eq!(err.operation(), Operation::ConveyTaskResult);
    assert_eq!(h.state_of(execution.id, "a").await, TaskState::Success);
}

#[tokio::test]
async fn late_error_does_not_reopen_a_successful_execution() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    for name in ["a", "b", "c"] {
        h.convey(execution.id, name, TaskState::Success).await.unwrap();
    }
    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Success);
    h.dispatched();

    let task = h.convey(execution.id, "c", TaskState::Error).await.unwrap();

    // The report itself is kept; the execution is not touched.
    assert_eq!(task.state, TaskState::Error);
    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Success);
    assert!(h.dispatched().is_empty());
}

#[tokio::test]
async fn late_successes_do_not_overturn_a_failed_execution() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    h.convey(execution.id, "c", TaskState::Error).await.unwrap();
    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Error);
    h.dispatched();

    for name in ["a", "b", "c"] {
        h.convey(execution.id, name, TaskState::Success).await.unwrap();
    }

    assert_eq!(h.execution_state(execution.id).await, ExecutionState::Error);
    assert!(h.dispatched().is_empty());
}

#[tokio::test]
async fn strict_transitions_accept_one_of_two_racing_reports() {
    let config = CoordinatorConfig {
        transitions: TransitionPolicy::Strict,
        ..CoordinatorConfig::default()
    };
    let h = Harness::new(config).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    let a = h.task_id(execution.id, "a").await;

    let handles: Vec<_> = [TaskState::Success, TaskState::Error]
        .into_iter()
        .map(|state| {
            let coordinator = Arc::clone(&h.coordinator);
            let execution_id = execution.id;
            tokio::spawn(async move {
                coordinator.convey_task_result(WF, execution_id, a, state, None).await
            })
        })
        .collect();

    let mut accepted = Vec::new();
    for handle in handles {
        if let Ok(task) = handle.await.unwrap() {
            accepted.push(task.state);
        }
    }

    assert_eq!(accepted.len(), 1);
    assert_eq!(h.state_of(execution.id, "a").await, accepted[0]);
}

// ============================================================
// Atomicity of the transaction and the dispatch
// ============================================================

#[tokio::test]
async fn unavailable_queue_before_commit_leaves_no_execution() {
    let config = CoordinatorConfig {
        dispatch_order: DispatchOrder::BeforeCommit,
        ..CoordinatorConfig::default()
    };
    let h = Harness::new(config).await;
    h.queue.set_unavailable(true);

    let err = h.coordinator.start_execution(WF, "c").await.unwrap_err();

    assert_eq!(err.operation(), Operation::StartExecution);
    assert_eq!(err.to_string(), "engine failure: cannot create execution");
    assert!(h.store.executions().await.is_empty());
}

#[tokio::test]
async fn unavailable_queue_before_commit_keeps_previous_task_state() {
    let config = CoordinatorConfig {
        dispatch_order: DispatchOrder::BeforeCommit,
        ..CoordinatorConfig::default()
    };
    let h = Harness::new(config).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    h.convey(execution.id, "a", TaskState::Success).await.unwrap();

    h.queue.set_unavailable(true);
    let err = h.convey(execution.id, "b", TaskState::Success).await.unwrap_err();

    assert_eq!(err.operation(), Operation::ConveyTaskResult);
    assert_eq!(h.state_of(execution.id, "b").await, TaskState::Running);
    assert_eq!(h.state_of(execution.id, "c").await, TaskState::Idle);
}

#[tokio::test]
async fn unavailable_queue_after_commit_removes_the_new_execution() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    h.queue.set_unavailable(true);

    let err = h.coordinator.start_execution(WF, "c").await.unwrap_err();

    assert_eq!(err.operation(), Operation::StartExecution);
    assert!(h.store.executions().await.is_empty());
}

#[tokio::test]
async fn unavailable_queue_after_commit_releases_claimed_tasks() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    h.dispatched();
    h.convey(execution.id, "a", TaskState::Success).await.unwrap();

    h.queue.set_unavailable(true);
    h.convey(execution.id, "b", TaskState::Success).await.unwrap_err();

    // The result itself was committed; only the claim on `c` is undone.
    assert_eq!(h.state_of(execution.id, "b").await, TaskState::Success);
    assert_eq!(h.state_of(execution.id, "c").await, TaskState::Idle);
    assert!(h.dispatched().is_empty());

    // The executor retries its report once the queue is back.
    h.queue.set_unavailable(false);
    h.convey(execution.id, "b", TaskState::Success).await.unwrap();
    assert_eq!(h.dispatched(), vec!["c"]);
    assert_eq!(h.state_of(execution.id, "c").await, TaskState::Running);
}

#[tokio::test]
async fn failed_commit_publishes_nothing_and_keeps_state() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();
    h.dispatched();
    h.convey(execution.id, "a", TaskState::Success).await.unwrap();

    h.store.set_commit_failure(true);
    let err = h.convey(execution.id, "b", TaskState::Success).await.unwrap_err();

    assert_eq!(err.operation(), Operation::ConveyTaskResult);
    assert!(h.dispatched().is_empty());
    assert_eq!(h.state_of(execution.id, "b").await, TaskState::Running);
    assert_eq!(h.state_of(execution.id, "c").await, TaskState::Idle);
}

// ============================================================
// Lookup failures
// ============================================================

#[tokio::test]
async fn unknown_workflow_or_target_creates_nothing() {
    let h = Harness::new(CoordinatorConfig::default()).await;

    let err = h.coordinator.start_execution("missing", "a").await.unwrap_err();
    assert_eq!(err.operation(), Operation::StartExecution);

    let err = h.coordinator.start_execution(WF, "ghost").await.unwrap_err();
    assert_eq!(err.operation(), Operation::StartExecution);
    assert!(format!("{:#}", err.cause()).contains("ghost"));

    assert!(h.store.executions().await.is_empty());
    assert_eq!(h.queue.batches(), 0);
}

#[tokio::test]
async fn unknown_task_or_execution_is_an_engine_error() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();

    let err = h
        .coordinator
        .convey_task_result(WF, execution.id, Uuid::new_v4(), TaskState::Success, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "engine failure: cannot update task or execution");

    let err = h.coordinator.get_execution(WF, Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.operation(), Operation::ReadExecution);

    let err = h.coordinator.get_execution("other", execution.id).await.unwrap_err();
    assert_eq!(err.operation(), Operation::ReadExecution);
}

#[tokio::test]
async fn deleted_definition_blocks_further_results() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    let execution = h.coordinator.start_execution(WF, "c").await.unwrap();

    h.definitions.delete(WF).await.unwrap();

    let err = h.convey(execution.id, "a", TaskState::Success).await.unwrap_err();
    assert_eq!(err.operation(), Operation::ConveyTaskResult);
    assert_eq!(h.state_of(execution.id, "a").await, TaskState::Running);
}
