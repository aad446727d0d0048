// RAG service context
//
// `RagContext` owns every external capability the pipelines use (embedder,
// chunker, vector store, LLM) and is shared by the HTTP handlers and the
// console tools. Ingestion lives in `ingest`, question answering in `query`.

pub mod ingest;
pub mod query;

pub use query::{FALLBACK_ANSWER, PROMPT_TEMPLATE};

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::{Chunker, Embedder, GeminiEmbedder, Retriever, StatisticalChunker};
use crate::llm::google::{DEFAULT_CHAT_MODEL, DEFAULT_FALLBACK_MODELS};
use crate::llm::{LLMProviderConfig, LLM};
use crate::models::DEFAULT_TOP_K;
use crate::storage::{LocalVectorStore, VectorStore};
use crate::types::{AppError, AppResult};

/// Tunables the pipelines read on every call.
#[derive(Debug, Clone)]
pub struct RagSettings {
    pub batch_size: usize,
    /// Minimum spacing between batch writes. Zero disables the throttle.
    pub batch_pause: Duration,
    pub top_k: usize,
    pub default_model: String,
    /// Tried in order when the requested model fails.
    pub fallback_models: Vec<String>,
    pub temperature: f32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_pause: Duration::from_millis(500),
            top_k: DEFAULT_TOP_K,
            default_model: DEFAULT_CHAT_MODEL.to_string(),
            fallback_models: DEFAULT_FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            temperature: 0.3,
        }
    }
}

impl RagSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.ingest.batch_size,
            batch_pause: config.batch_pause(),
            top_k: config.store.top_k,
            default_model: config.llm.default_model.clone(),
            fallback_models: config.llm.fallback_models.clone(),
            temperature: config.llm.temperature,
        }
    }
}

pub struct RagContext {
    embedder: Arc<dyn Embedder>,
    chunker: Arc<dyn Chunker>,
    store: Arc<dyn VectorStore>,
    retriever: Retriever,
    llm: LLM,
    settings: RagSettings,
    /// Serializes collection writes: ingestion batches and reset.
    write_lock: Mutex<()>,
}

impl RagContext {
    pub fn builder() -> RagContextBuilder {
        RagContextBuilder::default()
    }

    /// Build the Gemini-backed context and load the persisted collection,
    /// if one exists.
    pub async fn open(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let embedder: Arc<dyn Embedder> = Arc::new(GeminiEmbedder::with_client(
            client,
            &config.llm.google_api_key,
            &config.llm.base_url,
            &config.llm.embedding_model,
        ));
        let store = LocalVectorStore::open(
            &config.paths.persist_dir,
            config.store.collection_name.as_str(),
            embedder.model_name(),
        )
        .await?;
        let llm = LLM::new(LLMProviderConfig::google(&config.llm))?;

        let context = Self::builder()
            .embedder(embedder)
            .store(Arc::new(store))
            .llm(llm)
            .settings(RagSettings::from_config(config))
            .build()?;

        info!(
            collection = %config.store.collection_name,
            persist_dir = %config.paths.persist_dir.display(),
            vectors = context.count().await?,
            "RAG context ready"
        );
        Ok(context)
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub async fn count(&self) -> AppResult<usize> {
        self.store.count().await
    }

    /// Drop the whole collection. Returns whether anything existed.
    pub async fn reset(&self) -> AppResult<bool> {
        let _guard = self.write_lock.lock().await;
        let existed = self.store.delete_collection().await?;
        if existed {
            warn!("Vector collection cleared");
        }
        Ok(existed)
    }

    pub async fn shutdown(&self) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.flush().await?;
        info!("RAG context flushed");
        Ok(())
    }
}

#[derive(Default)]
pub struct RagContextBuilder {
    embedder: Option<Arc<dyn Embedder>>,
    chunker: Option<Arc<dyn Chunker>>,
    store: Option<Arc<dyn VectorStore>>,
    llm: Option<LLM>,
    settings: Option<RagSettings>,
}

impl RagContextBuilder {
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Defaults to a `StatisticalChunker` over the same embedder.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn llm(mut self, llm: LLM) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn settings(mut self, settings: RagSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> AppResult<RagContext> {
        let embedder = self
            .embedder
            .ok_or_else(|| AppError::Configuration("embedder is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| AppError::Configuration("vector store is required".to_string()))?;
        let llm = self
            .llm
            .ok_or_else(|| AppError::Configuration("llm is required".to_string()))?;
        let chunker = self
            .chunker
            .unwrap_or_else(|| Arc::new(StatisticalChunker::new(embedder.clone())));
        let settings = self.settings.unwrap_or_default();
        if settings.batch_size == 0 {
            return Err(AppError::Configuration(
                "batch size must be greater than 0".to_string(),
            ));
        }

        Ok(RagContext {
            retriever: Retriever::new(embedder.clone(), store.clone()),
            embedder,
            chunker,
            store,
            llm,
            settings,
            write_lock: Mutex::new(()),
        })
    }
}
