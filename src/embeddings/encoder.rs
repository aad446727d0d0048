// Embedding backends
//
// `Embedder` is the one seam between this crate and whatever turns text into
// vectors. The ingestion pipeline, the chunker and the retriever all take an
// `Arc<dyn Embedder>`, so the same function embeds documents and queries.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::llm::google::{check_response, model_path, GEMINI_API_BASE};
use crate::types::{AppError, AppResult};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Gemini rejects batch requests with more than 100 entries.
const MAX_BATCH_REQUESTS: usize = 100;

const SERVICE: &str = "embedding";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AppError::external(SERVICE, "backend returned no embedding"))
    }

    /// Recorded with persisted collections.
    fn model_name(&self) -> &str;
}

pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchEmbedContentsRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedContentsResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

impl GeminiEmbedder {
    pub fn new(api_key: &str) -> Self {
        Self::with_client(Client::new(), api_key, GEMINI_API_BASE, DEFAULT_EMBEDDING_MODEL)
    }

    pub fn with_client(client: Client, api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model_path(model),
        }
    }

    fn content<'a>(&'a self, text: &'a str, task_type: &'static str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.model,
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            task_type,
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model);
        let request = BatchEmbedContentsRequest {
            requests: texts
                .iter()
                .map(|t| self.content(t, "RETRIEVAL_DOCUMENT"))
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "batch embedding request failed");
                AppError::external(SERVICE, format!("request failed: {}", e))
            })?;

        let body: BatchEmbedContentsResponse = check_response(response, SERVICE)
            .await?
            .json()
            .await
            .map_err(|e| AppError::external(SERVICE, format!("failed to parse response: {}", e)))?;

        if body.embeddings.len() != texts.len() {
            return Err(AppError::external(
                SERVICE,
                format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    body.embeddings.len()
                ),
            ));
        }

        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, count = texts.len(), "Embedding documents");
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_REQUESTS) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}/{}:embedContent", self.base_url, self.model);
        debug!(model = %self.model, text_len = text.len(), "Embedding query");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.content(text, "RETRIEVAL_QUERY"))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "query embedding request failed");
                AppError::external(SERVICE, format!("request failed: {}", e))
            })?;

        let body: EmbedContentResponse = check_response(response, SERVICE)
            .await?
            .json()
            .await
            .map_err(|e| AppError::external(SERVICE, format!("failed to parse response: {}", e)))?;

        Ok(body.embedding.values)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
