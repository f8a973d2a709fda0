//! `engine` crate — domain models, definition validation, the dependency
//! resolver and the workflow execution coordinator.

pub mod models;
pub mod error;
pub mod dag;
pub mod resolver;
pub mod config;
pub mod definitions;
pub mod coordinator;

pub use models::{Execution, ExecutionState, Target, Task, TaskSpec, TaskState, WorkflowDefinition};
pub use error::{DefinitionError, DefinitionStoreError, EngineError, Operation};
pub use dag::{find_workflow_tasks, validate_definition};
pub use resolver::{Outcome, is_execution_complete, ready_tasks};
pub use config::{CoordinatorConfig, DispatchOrder, FailurePropagation, TransitionPolicy};
pub use definitions::{DefinitionStore, MemoryDefinitions, PgDefinitions};
pub use coordinator::{ExecutionView, WorkflowCoordinator};

#[cfg(test)]
mod coordinator_tests;
