//! `api` crate — HTTP REST API over the workflow coordinator.
//!
//! Exposes:
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:name
//!   DELETE /api/v1/workflows/:name
//!   POST   /api/v1/workflows/:name/executions
//!   GET    /api/v1/workflows/:name/executions/:id
//!   PUT    /api/v1/workflows/:name/executions/:id/tasks/:task_id

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;
use tracing::info;

use engine::WorkflowCoordinator;

pub mod error;
pub mod handlers;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<WorkflowCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<WorkflowCoordinator>) -> Self {
        Self { coordinator }
    }
}

pub fn router(state: AppState) -> Router {
    use handlers::{executions, tasks, workflows};

    Router::new()
        .route("/api/v1/workflows", get(workflows::list).post(workflows::create))
        .route(
            "/api/v1/workflows/:name",
            get(workflows::get).delete(workflows::delete),
        )
        .route("/api/v1/workflows/:name/executions", post(executions::start))
        .route("/api/v1/workflows/:name/executions/:id", get(executions::get))
        .route(
            "/api/v1/workflows/:name/executions/:id/tasks/:task_id",
            put(tasks::convey),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `bind` until Ctrl-C.
pub async fn serve(bind: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %listener.local_addr()?, "API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
}
