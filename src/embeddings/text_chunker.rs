// Semantic chunking
//
// `Chunker` is an external capability as far as the pipeline is concerned:
// it receives one document's text and returns ordered chunk contents.
// `StatisticalChunker` is a small stand-in that cuts where the similarity
// between a sentence and the window of sentences before it falls below a
// threshold derived from the document's own similarity distribution.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use super::cosine_similarity;
use super::encoder::Embedder;
use crate::types::{AppError, AppResult};

#[async_trait]
pub trait Chunker: Send + Sync {
    /// Ordered chunk contents for one document. Non-empty text yields at
    /// least one chunk.
    async fn chunk(&self, text: &str) -> AppResult<Vec<String>>;
}

pub struct StatisticalChunker {
    encoder: Arc<dyn Embedder>,
    window_size: usize,
    min_split_tokens: usize,
    max_split_tokens: usize,
}

impl StatisticalChunker {
    pub const DEFAULT_WINDOW_SIZE: usize = 5;
    pub const DEFAULT_MIN_SPLIT_TOKENS: usize = 100;
    pub const DEFAULT_MAX_SPLIT_TOKENS: usize = 300;

    pub fn new(encoder: Arc<dyn Embedder>) -> Self {
        Self {
            encoder,
            window_size: Self::DEFAULT_WINDOW_SIZE,
            min_split_tokens: Self::DEFAULT_MIN_SPLIT_TOKENS,
            max_split_tokens: Self::DEFAULT_MAX_SPLIT_TOKENS,
        }
    }

    pub fn with_split_tokens(mut self, min: usize, max: usize) -> Self {
        self.min_split_tokens = min;
        self.max_split_tokens = max.max(min).max(1);
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    /// similarity[i] compares sentence i+1 with the mean of the window ending at i.
    fn window_similarities(&self, embeddings: &[Vec<f32>]) -> Vec<f32> {
        (0..embeddings.len().saturating_sub(1))
            .map(|i| {
                let start = (i + 1).saturating_sub(self.window_size);
                let context = mean_vector(&embeddings[start..=i]);
                cosine_similarity(&context, &embeddings[i + 1])
            })
            .collect()
    }
}

#[async_trait]
impl Chunker for StatisticalChunker {
    async fn chunk(&self, text: &str) -> AppResult<Vec<String>> {
        let sentences = split_sentences(text);
        if sentences.len() <= 1 {
            return Ok(sentences);
        }

        let embeddings = self
            .encoder
            .embed_documents(&sentences)
            .await
            .map_err(|e| AppError::external("chunker", e))?;
        if embeddings.len() != sentences.len() {
            return Err(AppError::external(
                "chunker",
                format!("expected {} embeddings, got {}", sentences.len(), embeddings.len()),
            ));
        }

        let similarities = self.window_similarities(&embeddings);
        let threshold = dynamic_threshold(&similarities);

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = vec![sentences[0].as_str()];
        let mut current_tokens = token_count(&sentences[0]);

        for (i, sentence) in sentences.iter().enumerate().skip(1) {
            let tokens = token_count(sentence);
            let topic_shift = similarities[i - 1] < threshold && current_tokens >= self.min_split_tokens;
            let too_long = current_tokens + tokens > self.max_split_tokens;

            if topic_shift || too_long {
                chunks.push(current.join(" "));
                current.clear();
                current_tokens = 0;
            }
            current.push(sentence);
            current_tokens += tokens;
        }
        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        debug!(
            sentences = sentences.len(),
            chunks = chunks.len(),
            threshold,
            "Chunked document"
        );
        Ok(chunks)
    }
}

/// Split into sentences on Unicode sentence boundaries and on blank lines.
/// Single line breaks count as spaces. Whitespace inside a sentence is
/// collapsed.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>().join(" "))
        .flat_map(|paragraph| {
            paragraph
                .split_sentence_bounds()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn mean_vector(vectors: &[Vec<f32>]) -> Vec<f32> {
    let dims = vectors.first().map_or(0, |v| v.len());
    let mut mean = vec![0.0f32; dims];
    for vector in vectors {
        for (acc, value) in mean.iter_mut().zip(vector) {
            *acc += value;
        }
    }
    let n = vectors.len().max(1) as f32;
    mean.iter_mut().for_each(|v| *v /= n);
    mean
}

/// Mean minus one standard deviation of the observed similarities.
fn dynamic_threshold(similarities: &[f32]) -> f32 {
    if similarities.is_empty() {
        return 0.0;
    }
    let n = similarities.len() as f32;
    let mean = similarities.iter().sum::<f32>() / n;
    let variance = similarities.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
    mean - variance.sqrt()
}
