// Type definitions: LLM request/response shapes and the error taxonomy

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing API key or an unusable setting.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Empty or unreadable input documents.
    #[error("No text content found")]
    NoContent,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Embedding, chunking, vector-store or LLM failure. `message` keeps the
    /// underlying cause.
    #[error("{service} error: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },

    /// A batch write failed after `committed` chunks were already stored.
    #[error("ingestion stopped after {committed} chunks were committed: {source}")]
    PartialIngest {
        committed: usize,
        #[source]
        source: Box<AppError>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn external(service: &'static str, error: impl std::fmt::Display) -> Self {
        AppError::ExternalService {
            service,
            message: error.to_string(),
        }
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
