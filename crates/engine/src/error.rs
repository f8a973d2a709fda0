//! Engine-level error types.

use thiserror::Error;

/// Problems with a workflow definition, found before anything is persisted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    /// The definition has no tasks at all.
    #[error("workflow '{0}' defines no tasks")]
    Empty(String),

    /// Two or more tasks share the same name.
    #[error("duplicate task name: '{0}'")]
    DuplicateTask(String),

    /// A task requires a task that doesn't exist in the definition.
    #[error("task '{task}' requires unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// A name (target or stored task) is not part of the definition.
    #[error("unknown task: '{0}'")]
    UnknownTask(String),
}

/// Errors from a [`DefinitionStore`](crate::definitions::DefinitionStore).
#[derive(Debug, Error)]
pub enum DefinitionStoreError {
    #[error("workflow '{0}' not found")]
    NotFound(String),

    #[error("workflow '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid workflow definition: {0}")]
    Invalid(#[from] DefinitionError),

    #[error("stored definition cannot be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

/// The coordinator operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    StartExecution,
    ConveyTaskResult,
    ReadExecution,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartExecution => f.write_str("cannot create execution"),
            Self::ConveyTaskResult => f.write_str("cannot update task or execution"),
            Self::ReadExecution => f.write_str("cannot read execution"),
        }
    }
}

/// The only failure the coordinator surfaces.
///
/// Callers see which operation failed, never why: a missing definition, an
/// unreachable queue and an unknown task id all look the same from outside.
/// The underlying cause chain is kept for logs via [`EngineError::cause`] and
/// [`std::error::Error::source`].
#[derive(Debug)]
pub struct EngineError {
    operation: Operation,
    cause: anyhow::Error,
}

impl EngineError {
    pub fn new(operation: Operation, cause: anyhow::Error) -> Self {
        Self { operation, cause }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine failure: {}", self.operation)
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause)
    }
}
