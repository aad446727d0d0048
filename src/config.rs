use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{AppError, AppResult};

/// Optional settings file read from the working directory.
pub const CONFIG_FILE: &str = "rag.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub max_upload_bytes: usize,
}

#[derive(Clone, Deserialize)]
pub struct LLMConfig {
    #[serde(default)]
    pub google_api_key: String,
    pub default_model: String,
    #[serde(default)]
    pub fallback_models: Vec<String>,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_retries: u32,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

// Keeps the API key out of startup logs.
impl std::fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMConfig")
            .field("google_api_key", &if self.google_api_key.is_empty() { "<unset>" } else { "<set>" })
            .field("default_model", &self.default_model)
            .field("fallback_models", &self.fallback_models)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub collection_name: String,
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub batch_pause_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub persist_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub documents_dir: PathBuf,
}

impl Config {
    /// Load `.env`, then layer defaults, `rag.toml` and `RAG__*` variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load(Some(Path::new(CONFIG_FILE)))
    }

    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000_i64)?
            .set_default("server.max_upload_bytes", 50_i64 * 1024 * 1024)?
            .set_default("llm.default_model", crate::llm::google::DEFAULT_CHAT_MODEL)?
            .set_default("llm.fallback_models", crate::llm::google::DEFAULT_FALLBACK_MODELS.to_vec())?
            .set_default("llm.embedding_model", crate::embeddings::encoder::DEFAULT_EMBEDDING_MODEL)?
            .set_default("llm.temperature", 0.3_f64)?
            .set_default("llm.max_retries", 2_i64)?
            .set_default("llm.base_url", crate::llm::google::GEMINI_API_BASE)?
            .set_default("llm.request_timeout_secs", 120_i64)?
            .set_default("store.collection_name", "gemini_rag_collection")?
            .set_default("store.top_k", 5_i64)?
            .set_default("ingest.batch_size", 50_i64)?
            .set_default("ingest.batch_pause_ms", 500_i64)?
            .set_default("paths.persist_dir", "database_gemini")?
            .set_default("paths.uploads_dir", "temp_rag_uploads")?
            .set_default("paths.documents_dir", "documents")?;

        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(false));
        }

        let api_key = non_empty_var("GOOGLE_API_KEY").or_else(|| non_empty_var("GEMINI_API_KEY"));

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("RAG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("llm.fallback_models"),
            )
            .set_override_option("server.port", non_empty_var("PORT"))?
            .set_override_option("server.host", non_empty_var("HOST"))?
            .set_override_option("llm.google_api_key", api_key)?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            bail!("ingest.batch_size must be greater than 0");
        }
        if self.store.top_k == 0 {
            bail!("store.top_k must be greater than 0");
        }
        Ok(())
    }

    /// The console tools refuse to start without a key.
    pub fn require_api_key(&self) -> AppResult<&str> {
        if self.llm.google_api_key.is_empty() {
            return Err(AppError::Configuration(
                "GOOGLE_API_KEY not found in environment. Set it in .env or session.".to_string(),
            ));
        }
        Ok(&self.llm.google_api_key)
    }

    pub fn has_api_key(&self) -> bool {
        !self.llm.google_api_key.is_empty()
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.server.host, self.server.port).parse()?)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.ingest.batch_pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.request_timeout_secs)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
