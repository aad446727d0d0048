use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use tokio::fs;
use tracing::{info, warn};

use super::run_detached;
use crate::models::{AppState, IngestResponse, IngestResult, StatusResponse};
use crate::pipeline::RagContext;
use crate::types::{AppError, AppResult};

const FILE_FIELD: &str = "file";
const DEFAULT_FILENAME: &str = "upload";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(post_ingest))
        .with_state(state)
}

/// Save the uploaded file under a fresh directory, ingest it and remove the
/// directory whatever the outcome.
pub async fn post_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let (filename, data) = read_upload(&mut multipart).await?;
    info!(filename = %filename, bytes = data.len(), "Received upload");

    let rag = state.rag.clone();
    let uploads_dir = state.config.paths.uploads_dir.clone();
    let name = filename.clone();
    let result = run_detached(async move { ingest_upload(rag, uploads_dir, name, data).await }).await;

    match result {
        Ok(IngestResult { chunks_added }) => Ok(Json(IngestResponse {
            status: "success".to_string(),
            filename,
            chunks_added,
        })
        .into_response()),
        Err(AppError::NoContent) => {
            warn!(filename = %filename, "Upload has no text content");
            Ok(Json(StatusResponse::new("error", AppError::NoContent.to_string())).into_response())
        }
        Err(e) => Err(e),
    }
}

async fn read_upload(multipart: &mut Multipart) -> AppResult<(String, Bytes)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("malformed upload: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .and_then(sanitize_filename)
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidRequest(format!("failed to read upload: {}", e)))?;
        return Ok((filename, data));
    }

    Err(AppError::InvalidRequest(format!(
        "missing multipart field '{}'",
        FILE_FIELD
    )))
}

async fn ingest_upload(
    rag: Arc<RagContext>,
    uploads_dir: PathBuf,
    filename: String,
    data: Bytes,
) -> AppResult<IngestResult> {
    let upload_dir = uploads_dir.join(uuid::Uuid::new_v4().to_string());
    fs::create_dir_all(&upload_dir).await?;

    let path = upload_dir.join(&filename);
    let result = match fs::write(&path, &data).await {
        Ok(()) => rag.ingest(&path).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = fs::remove_dir_all(&upload_dir).await {
        warn!(dir = %upload_dir.display(), error = %e, "Failed to remove upload directory");
    }
    result
}

/// Keep only the final path component of a client-supplied name.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}
