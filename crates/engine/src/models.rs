//! Core domain models for the workflow coordinator.
//!
//! A [`WorkflowDefinition`] is the static graph; it can be serialised to/from
//! the JSONB `definition` column of the `workflows` table. [`Execution`] and
//! [`Task`] are runtime views built from store rows, with each task joined to
//! its [`TaskSpec`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use db::{ExecutionRow, TaskRow};
use queue::TaskMessage;

pub use db::{ExecutionState, TaskState};

// ---------------------------------------------------------------------------
// TaskSpec
// ---------------------------------------------------------------------------

/// A single task in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique identifier within this definition (referenced by `requires`).
    pub name: String,
    /// Tasks that must succeed before this one becomes ready.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Executor-side action name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Arbitrary parameters handed to the executor.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            action: None,
            parameters: serde_json::Value::Null,
        }
    }

    pub fn requires<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A complete, immutable workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub tasks: Vec<TaskSpec>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, tasks: Vec<TaskSpec>) -> Self {
        Self { name: name.into(), tasks }
    }

    /// Look up a task spec by name.
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// What an execution is trying to reach.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// One task and, transitively, everything it requires.
    Task(String),
    /// Every task of the definition.
    AllTasks,
}

impl Target {
    /// Target name that selects the whole graph.
    pub const ALL_TASKS: &'static str = "*";
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        if name == Self::ALL_TASKS {
            Self::AllTasks
        } else {
            Self::Task(name.to_owned())
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task(name) => f.write_str(name),
            Self::AllTasks => f.write_str(Self::ALL_TASKS),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One instantiation of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_name: String,
    pub target_task: String,
    pub state: ExecutionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    pub fn target(&self) -> Target {
        Target::from(self.target_task.as_str())
    }
}

impl From<ExecutionRow> for Execution {
    fn from(row: ExecutionRow) -> Self {
        Self {
            id: row.id,
            workflow_name: row.workflow_name,
            target_task: row.target_task,
            state: row.state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A task instance joined with the spec it was created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub workflow_name: String,
    pub name: String,
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub parameters: serde_json::Value,
    pub state: TaskState,
    pub result: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn from_row(row: TaskRow, spec: &TaskSpec) -> Self {
        Self {
            id: row.id,
            execution_id: row.execution_id,
            workflow_name: row.workflow_name,
            name: row.name,
            requires: spec.requires.clone(),
            action: spec.action.clone(),
            parameters: spec.parameters.clone(),
            state: row.state,
            result: row.result,
            updated_at: row.updated_at,
        }
    }

    /// The dispatch notification for this task.
    pub fn to_message(&self) -> TaskMessage {
        TaskMessage {
            workflow_name: self.workflow_name.clone(),
            execution_id: self.execution_id,
            task_id: self.id,
            task_name: self.name.clone(),
            action: self.action.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definition_parses_with_defaults() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "wb",
            "tasks": [
                { "name": "a" },
                { "name": "b", "requires": ["a"], "action": "shell", "parameters": { "cmd": "ls" } }
            ]
        }))
        .unwrap();

        assert_eq!(def.task("a").unwrap().requires, Vec::<String>::new());
        assert_eq!(def.task("a").unwrap().parameters, serde_json::Value::Null);
        assert_eq!(def.task("b").unwrap().action.as_deref(), Some("shell"));
        assert!(def.task("c").is_none());
    }

    #[test]
    fn star_selects_the_whole_graph() {
        assert_eq!(Target::from("*"), Target::AllTasks);
        assert_eq!(Target::from("deploy"), Target::Task("deploy".into()));
        assert_eq!(Target::AllTasks.to_string(), "*");
    }

    #[test]
    fn message_carries_spec_parameters() {
        let spec = TaskSpec::new("b")
            .requires(["a"])
            .with_action("http")
            .with_parameters(json!({ "url": "https://example.com" }));
        let now = Utc::now();
        let row = TaskRow {
            id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            workflow_name: "wb".into(),
            name: "b".into(),
            state: TaskState::Idle,
            result: None,
            created_at: now,
            updated_at: now,
        };

        let task = Task::from_row(row.clone(), &spec);
        let msg = task.to_message();
        assert_eq!(msg.task_id, row.id);
        assert_eq!(msg.execution_id, row.execution_id);
        assert_eq!(msg.action.as_deref(), Some("http"));
        assert_eq!(msg.parameters["url"], "https://example.com");
    }
}
