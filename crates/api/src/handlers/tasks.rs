use axum::{
    extract::{Path, State},
    Json,
};
use engine::{Task, TaskState};
use serde_json::Value;
use uuid::Uuid;

use crate::{ApiError, AppState};

/// What an executor reports for one task.
#[derive(serde::Deserialize)]
pub struct ConveyResultDto {
    pub state: TaskState,
    #[serde(default)]
    pub result: Option<Value>,
}

pub async fn convey(
    Path((name, execution_id, task_id)): Path<(String, Uuid, Uuid)>,
    State(state): State<AppState>,
    Json(payload): Json<ConveyResultDto>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .coordinator
        .convey_task_result(&name, execution_id, task_id, payload.state, payload.result)
        .await?;
    Ok(Json(task))
}
