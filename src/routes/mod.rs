//! API Routes
//!
//! - `GET /` - Liveness probe
//! - `POST /chat` - Answer a question from the stored documents
//! - `POST /ingest` - Upload one file and add it to the collection
//! - `GET /reset` - Drop the whole collection
//!
//! Handler work runs on a detached task, so a client that disconnects does
//! not cancel an ingestion or an answer that is already under way.

pub mod chat;
pub mod health;
pub mod ingest;
pub mod reset;

use std::future::Future;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::models::AppState;
use crate::types::{AppError, AppResult};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .merge(health::router())
        .merge(chat::router(state.clone()))
        .merge(ingest::router(state.clone()))
        .merge(reset::router(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Run `work` on its own task and wait for it.
pub(crate) async fn run_detached<F, T>(work: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::Internal(format!("request task failed: {}", e)))?
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidRequest(_) | AppError::NoContent => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = match &self {
            AppError::PartialIngest { committed, .. } => json!({
                "detail": self.to_string(),
                "chunks_committed": committed,
            }),
            _ => json!({ "detail": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
