use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ScoredVector, VectorStore};
use crate::embeddings::cosine_similarity;
use crate::models::StoredVector;
use crate::types::{AppError, AppResult};

const SERVICE: &str = "vector store";

/// On-disk shape of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Collection {
    name: String,
    embedding_model: String,
    dimensions: Option<usize>,
    updated_at: DateTime<Utc>,
    vectors: HashMap<String, StoredVector>,
}

impl Collection {
    fn new(name: &str, embedding_model: &str) -> Self {
        Self {
            name: name.to_string(),
            embedding_model: embedding_model.to_string(),
            dimensions: None,
            updated_at: Utc::now(),
            vectors: HashMap::new(),
        }
    }
}

/// Brute-force cosine store for a single named collection.
///
/// The collection is created lazily by the first upsert. When a persist
/// directory is set, every mutation rewrites `<dir>/<name>.json` through a
/// temporary file and rename.
pub struct LocalVectorStore {
    name: String,
    embedding_model: String,
    persist_dir: Option<PathBuf>,
    collection: RwLock<Option<Collection>>,
}

impl LocalVectorStore {
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            embedding_model: String::new(),
            persist_dir: None,
            collection: RwLock::new(None),
        }
    }

    /// Open a persisted collection, loading it if the file already exists.
    /// The directory itself is only created on the first write.
    pub async fn open(
        persist_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> AppResult<Self> {
        let store = Self {
            name: name.into(),
            embedding_model: embedding_model.into(),
            persist_dir: Some(persist_dir.into()),
            collection: RwLock::new(None),
        };

        if let Some(path) = store.collection_path() {
            if fs::try_exists(&path).await? {
                let data = fs::read(&path).await?;
                let collection: Collection = serde_json::from_slice(&data).map_err(|e| {
                    AppError::external(SERVICE, format!("corrupt collection file {}: {}", path.display(), e))
                })?;

                if collection.embedding_model != store.embedding_model {
                    warn!(
                        stored = %collection.embedding_model,
                        configured = %store.embedding_model,
                        "Collection was embedded with a different model; similarity scores may be meaningless"
                    );
                }
                info!(
                    collection = %collection.name,
                    vectors = collection.vectors.len(),
                    path = %path.display(),
                    "Loaded vector collection"
                );
                *store.collection.write().await = Some(collection);
            }
        }

        Ok(store)
    }

    fn collection_path(&self) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", self.name)))
    }

    async fn persist(&self, collection: &Collection) -> AppResult<()> {
        let Some(path) = self.collection_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec(collection).map_err(|e| AppError::external(SERVICE, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn upsert(&self, vectors: &[StoredVector]) -> AppResult<()> {
        if vectors.is_empty() {
            return Ok(());
        }

        let mut guard = self.collection.write().await;
        let dimensions = guard
            .as_ref()
            .and_then(|c| c.dimensions)
            .unwrap_or_else(|| vectors[0].embedding.len());
        if dimensions == 0 {
            return Err(AppError::external(SERVICE, "cannot store an empty embedding"));
        }
        if let Some(bad) = vectors.iter().find(|v| v.embedding.len() != dimensions) {
            return Err(AppError::external(
                SERVICE,
                format!(
                    "embedding dimension mismatch for {}: expected {}, got {}",
                    bad.id,
                    dimensions,
                    bad.embedding.len()
                ),
            ));
        }

        let created = guard.is_none();
        let collection = guard.get_or_insert_with(|| Collection::new(&self.name, &self.embedding_model));
        let previous = (collection.dimensions, collection.updated_at);
        let replaced: Vec<(String, Option<StoredVector>)> = vectors
            .iter()
            .map(|v| (v.id.clone(), collection.vectors.insert(v.id.clone(), v.clone())))
            .collect();
        collection.dimensions = Some(dimensions);
        collection.updated_at = Utc::now();

        // The batch only stays in memory once it is on disk.
        if let Err(e) = self.persist(collection).await {
            for (id, old) in replaced.into_iter().rev() {
                match old {
                    Some(old) => collection.vectors.insert(id, old),
                    None => collection.vectors.remove(&id),
                };
            }
            (collection.dimensions, collection.updated_at) = previous;
            if created {
                *guard = None;
            }
            return Err(e);
        }

        debug!(
            collection = %self.name,
            added = vectors.len(),
            total = collection.vectors.len(),
            "Upserted vectors"
        );
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> AppResult<Vec<ScoredVector>> {
        let guard = self.collection.read().await;
        let Some(collection) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        if let Some(dimensions) = collection.dimensions {
            if dimensions != embedding.len() {
                return Err(AppError::external(
                    SERVICE,
                    format!(
                        "query dimension mismatch: collection has {}, query has {}",
                        dimensions,
                        embedding.len()
                    ),
                ));
            }
        }

        let mut scored: Vec<ScoredVector> = collection
            .vectors
            .values()
            .map(|vector| ScoredVector {
                score: cosine_similarity(&vector.embedding, embedding),
                vector: vector.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.vector.id.cmp(&b.vector.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self
            .collection
            .read()
            .await
            .as_ref()
            .map(|c| c.vectors.len())
            .unwrap_or(0))
    }

    async fn delete_collection(&self) -> AppResult<bool> {
        let mut guard = self.collection.write().await;
        let mut existed = false;

        // File first: memory is only cleared once the file is gone.
        if let Some(path) = self.collection_path() {
            if fs::try_exists(&path).await? {
                fs::remove_file(&path).await?;
                existed = true;
            }
        }
        existed |= guard.take().is_some();

        info!(collection = %self.name, existed, "Deleted vector collection");
        Ok(existed)
    }

    async fn flush(&self) -> AppResult<()> {
        let guard = self.collection.read().await;
        if let Some(collection) = guard.as_ref() {
            self.persist(collection).await?;
        }
        Ok(())
    }
}
