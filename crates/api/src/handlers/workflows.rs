use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::WorkflowDefinition;

use crate::{ApiError, AppState};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<WorkflowDefinition>>, ApiError> {
    let definitions = state.coordinator.definitions().list().await?;
    Ok(Json(definitions))
}

pub async fn get(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    let definition = state.coordinator.definitions().get(&name).await?;
    Ok(Json(definition))
}

/// Register a definition. It is validated before being stored and is never
/// overwritten.
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<WorkflowDefinition>,
) -> Result<(StatusCode, Json<WorkflowDefinition>), ApiError> {
    state.coordinator.definitions().create(payload.clone()).await?;
    Ok((StatusCode::CREATED, Json(payload)))
}

pub async fn delete(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.coordinator.definitions().delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
