use axum::{extract::State, response::Json as ResponseJson, routing::post, Json, Router};
use tracing::info;

use super::run_detached;
use crate::models::{AppState, ChatRequest, ChatResponse, Query};
use crate::types::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(post_chat))
        .with_state(state)
}

/// `history` is accepted but not used: every question is answered on its own.
pub async fn post_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<ResponseJson<ChatResponse>, AppError> {
    let question = request.message.trim().to_string();
    if question.is_empty() {
        return Err(AppError::InvalidRequest("message must not be empty".to_string()));
    }
    info!(
        model = %request.model,
        history = request.history.len(),
        "Received chat request"
    );

    let rag = state.rag.clone();
    let query = Query::new(question, rag.settings().top_k);
    let model = request.model;
    let answer = run_detached(async move { rag.answer(&query, Some(model.as_str())).await }).await?;

    Ok(Json(ChatResponse {
        content: answer.text,
        sources: answer.sources,
    }))
}
