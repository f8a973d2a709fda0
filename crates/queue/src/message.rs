//! The message published for every dispatched task.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification that a task is ready to run.
///
/// Carries everything an executor needs, so it never has to read the
/// definition itself. `task_id` is the deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub workflow_name: String,
    pub execution_id: Uuid,
    pub task_id: Uuid,
    pub task_name: String,
    /// Executor-side action to run, if the definition names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}
