//! Mapping of engine failures onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use engine::{DefinitionStoreError, EngineError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Definitions(#[from] DefinitionStoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            // Coordinator failures are deliberately coarse.
            Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Definitions(DefinitionStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Definitions(DefinitionStoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
            Self::Definitions(
                DefinitionStoreError::Invalid(_) | DefinitionStoreError::Decode(_),
            ) => StatusCode::BAD_REQUEST,
            Self::Definitions(DefinitionStoreError::Database(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
