// Vector storage layer
//
// The store is an external capability: the pipeline only sees the
// `VectorStore` trait. `LocalVectorStore` is a brute-force cosine store kept
// in memory and, when opened on a directory, persisted as one JSON file per
// collection.

pub mod vector_store;

pub use vector_store::*;

use async_trait::async_trait;

use crate::models::StoredVector;
use crate::types::AppResult;

/// A stored vector paired with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredVector {
    pub vector: StoredVector,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace vectors keyed by id. All embeddings in a collection
    /// share one dimensionality; the first write fixes it.
    async fn upsert(&self, vectors: &[StoredVector]) -> AppResult<()>;

    /// Return at most `top_k` vectors ordered by non-increasing similarity.
    /// A missing collection yields no results.
    async fn search(&self, embedding: &[f32], top_k: usize) -> AppResult<Vec<ScoredVector>>;

    async fn count(&self) -> AppResult<usize>;

    /// Drop the whole collection. Returns whether anything existed.
    async fn delete_collection(&self) -> AppResult<bool>;

    async fn flush(&self) -> AppResult<()> {
        Ok(())
    }
}
