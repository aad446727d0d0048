// Similarity retrieval over the vector store

use std::sync::Arc;

use tracing::debug;

use super::encoder::Embedder;
use crate::models::{Query, RetrievedChunk};
use crate::storage::VectorStore;
use crate::types::AppResult;

/// Embeds a question with the same embedder used at ingestion time and
/// returns the closest stored chunks.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// At most `query.top_k` chunks, most similar first, ranked from 0.
    /// An empty or missing collection yields an empty list.
    pub async fn retrieve(&self, query: &Query) -> AppResult<Vec<RetrievedChunk>> {
        let embedding = self.embedder.embed_query(&query.question).await?;
        let hits = self.store.search(&embedding, query.top_k).await?;

        debug!(top_k = query.top_k, hits = hits.len(), "Retrieved context");

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| RetrievedChunk {
                chunk: hit.vector.to_chunk(),
                rank,
                score: hit.score,
            })
            .collect())
    }
}
