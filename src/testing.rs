// Test doubles shared by the unit tests

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::embeddings::{split_sentences, Chunker, Embedder};
use crate::llm::{LLMAdapter, LLM};
use crate::pipeline::{RagContext, RagSettings, FALLBACK_ANSWER};
use crate::storage::{LocalVectorStore, VectorStore};
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

const HASH_DIMENSIONS: usize = 256;

/// Deterministic bag-of-words embedder: each lowercased word is hashed into
/// one of 256 buckets and the result is L2-normalized.
#[derive(Default)]
pub struct HashEmbedder {
    calls: AtomicUsize,
    fail_after: Option<usize>,
}

impl HashEmbedder {
    pub fn failing() -> Self {
        Self::failing_after(0)
    }

    /// Succeed for the first `calls` calls, then fail every call.
    pub fn failing_after(calls: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_after: Some(calls),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASH_DIMENSIONS];
        for word in words(text) {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() as usize) % HASH_DIMENSIONS] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| call >= limit) {
            return Err(AppError::external("embedding", "quota exceeded"));
        }
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}

/// One chunk per sentence; never calls an embedder.
pub struct SentenceChunker;

#[async_trait]
impl Chunker for SentenceChunker {
    async fn chunk(&self, text: &str) -> AppResult<Vec<String>> {
        Ok(split_sentences(text))
    }
}

/// Answers with the context sentence sharing the most words with the
/// question, or the fallback phrase when none shares any.
#[derive(Default)]
pub struct ContextEchoAdapter {
    calls: AtomicUsize,
}

impl ContextEchoAdapter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMAdapter for ContextEchoAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let context = between(prompt, "<context>", "</context>").unwrap_or_default();
        let question = prompt.rsplit("Question:").next().unwrap_or_default();
        let keywords: HashSet<String> = words(question).filter(|w| w.len() > 3).collect();

        let best = split_sentences(context)
            .into_iter()
            .map(|sentence| {
                let overlap = words(&sentence).filter(|w| keywords.contains(w)).count();
                (overlap, sentence)
            })
            .filter(|(overlap, _)| *overlap > 0)
            .max_by_key(|(overlap, _)| *overlap)
            .map(|(_, sentence)| sentence)
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string());

        Ok(LLMResponse {
            content: format!("  {}\n", best),
            finish_reason: "STOP".to_string(),
            usage: TokenUsage::default(),
        })
    }
}

pub struct FailingAdapter;

#[async_trait]
impl LLMAdapter for FailingAdapter {
    async fn create_chat_completion(&self, _request: &LLMRequest) -> AppResult<LLMResponse> {
        Err(AppError::external("llm", "model overloaded"))
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end)? + from;
    Some(&text[from..to])
}

pub fn test_settings() -> RagSettings {
    RagSettings {
        batch_pause: std::time::Duration::ZERO,
        ..RagSettings::default()
    }
}

/// In-memory context with the hashing embedder and the echoing model.
pub fn test_context() -> RagContext {
    test_context_with(
        Arc::new(HashEmbedder::default()),
        Arc::new(ContextEchoAdapter::default()),
    )
}

pub fn test_context_with(embedder: Arc<dyn Embedder>, adapter: Arc<dyn LLMAdapter>) -> RagContext {
    let store: Arc<dyn VectorStore> = Arc::new(LocalVectorStore::in_memory("test_collection"));
    RagContext::builder()
        .embedder(embedder)
        .store(store)
        .llm(LLM::from_adapter("test", adapter))
        .settings(test_settings())
        .build()
        .unwrap()
}

/// Defaults with every path moved under `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::load(None).unwrap();
    config.paths.persist_dir = dir.join("database_gemini");
    config.paths.uploads_dir = dir.join("temp_rag_uploads");
    config.paths.documents_dir = dir.join("documents");
    config.ingest.batch_pause_ms = 0;
    config
}

/// A 600-word single-page document with one fact buried in the middle.
pub fn azuria_document() -> String {
    let fillers = [
        "Farmers in the northern valleys harvest barley before autumn rains.",
        "Merchants travel along river roads carrying copper and woven cloth.",
        "Winters bring heavy snow that closes mountain passes for months.",
        "Local musicians perform long old ballads during the midsummer festival.",
        "Fishermen mend their nets each evening near the quiet harbor.",
        "Children learn weaving from grandparents during the long winter nights.",
    ];
    let mut sentences: Vec<&str> = Vec::new();
    for i in 0..59 {
        if i == 30 {
            sentences.push("The capital of Azuria is Korrun.");
        }
        sentences.push(fillers[i % fillers.len()]);
    }
    sentences.push("Travelers often praise it.");
    sentences.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azuria_document_length() {
        let doc = azuria_document();
        assert_eq!(doc.split_whitespace().count(), 600);
        assert!(doc.contains("The capital of Azuria is Korrun."));
    }

    #[test]
    fn test_hash_embedding_is_normalized() {
        let v = HashEmbedder::embed("some words here");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
