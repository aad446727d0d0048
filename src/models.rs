use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::RagContext;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub rag: Arc<RagContext>,
}

// Pipeline data model

/// Text of one logical document (all pages joined), tagged with its file name.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub text: String,
    pub source: String,
}

/// One chunker-produced segment of a document. Identity is `chunk_id`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub content: String,
    pub source: String,
    pub index: usize,
    pub token_count: Option<usize>,
}

impl Chunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>, index: usize) -> Self {
        let content = content.into();
        let token_count = Some(content.split_whitespace().count());
        Self {
            chunk_id: uuid::Uuid::new_v4().to_string(),
            content,
            source: source.into(),
            index,
            token_count,
        }
    }
}

/// A chunk as held by the vector store: id, embedding, content and flat metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoredVector {
    pub id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub metadata: HashMap<String, String>,
}

impl StoredVector {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), chunk.source.clone());
        metadata.insert("chunk_index".to_string(), chunk.index.to_string());
        metadata.insert("chunk_id".to_string(), chunk.chunk_id.clone());
        if let Some(tokens) = chunk.token_count {
            metadata.insert("token_count".to_string(), tokens.to_string());
        }

        Self {
            id: chunk.chunk_id.clone(),
            embedding,
            content: chunk.content.clone(),
            metadata,
        }
    }

    pub fn to_chunk(&self) -> Chunk {
        Chunk {
            chunk_id: self.id.clone(),
            content: self.content.clone(),
            source: self
                .metadata
                .get("source")
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            index: self
                .metadata
                .get("chunk_index")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            token_count: self.metadata.get("token_count").and_then(|v| v.parse().ok()),
        }
    }
}

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone)]
pub struct Query {
    pub question: String,
    pub top_k: usize,
}

impl Query {
    pub fn new(question: impl Into<String>, top_k: usize) -> Self {
        Self {
            question: question.into(),
            top_k: top_k.max(1),
        }
    }
}

impl From<&str> for Query {
    fn from(question: &str) -> Self {
        Self::new(question, DEFAULT_TOP_K)
    }
}

/// A retrieved chunk with its 0-based similarity rank.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub rank: usize,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Deduplicated, in first-seen order of `context`.
    pub sources: Vec<String>,
    pub context: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IngestResult {
    pub chunks_added: usize,
}

// API Request/Response types

#[derive(Debug, serde::Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Accepted in any shape for client compatibility; each request is
    /// answered on its own.
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
    #[serde(default = "default_chat_model")]
    pub model: String,
}

fn default_chat_model() -> String {
    crate::llm::google::DEFAULT_CHAT_MODEL.to_string()
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub sources: Vec<String>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub filename: String,
    pub chunks_added: usize,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn new(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}
