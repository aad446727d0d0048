use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::error;

use super::run_detached;
use crate::models::{AppState, StatusResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/reset", get(reset_collection))
        .with_state(state)
}

/// Drops the entire collection. There is no confirmation step.
pub async fn reset_collection(State(state): State<AppState>) -> Response {
    let rag = state.rag.clone();
    match run_detached(async move { rag.reset().await }).await {
        Ok(true) => Json(StatusResponse::new("success", "Collection cleared")).into_response(),
        Ok(false) => Json(StatusResponse::new("ignored", "DB does not exist")).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to reset collection");
            Json(json!({ "status": "error", "detail": e.to_string() })).into_response()
        }
    }
}
