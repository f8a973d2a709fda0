use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::{Execution, ExecutionView};
use uuid::Uuid;

use crate::{ApiError, AppState};

#[derive(serde::Deserialize)]
pub struct StartExecutionDto {
    /// A task name, or `"*"` for the whole workflow.
    pub target_task: String,
}

pub async fn start(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<StartExecutionDto>,
) -> Result<(StatusCode, Json<Execution>), ApiError> {
    let execution = state
        .coordinator
        .start_execution(&name, &payload.target_task)
        .await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

pub async fn get(
    Path((name, id)): Path<(String, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionView>, ApiError> {
    let view = state.coordinator.get_execution(&name, id).await?;
    Ok(Json(view))
}
