// Ingestion: load -> chunk -> embed -> batched store writes

use std::path::Path;

use governor::{Quota, RateLimiter};
use tracing::{error, info};

use super::RagContext;
use crate::embeddings::DocumentProcessor;
use crate::models::{Chunk, IngestResult, RawDocument, StoredVector};
use crate::types::{AppError, AppResult};

impl RagContext {
    /// Ingest a file or every supported file in a directory.
    pub async fn ingest(&self, source: &Path) -> AppResult<IngestResult> {
        let documents = DocumentProcessor::load_source(source).await?;
        self.ingest_documents(documents).await
    }

    /// Chunk every document, then embed and store the chunks in batches.
    ///
    /// Nothing is written unless every document has text and chunks cleanly.
    /// A failed batch stops the run with `PartialIngest`, which carries the
    /// number of chunks already stored.
    pub async fn ingest_documents(&self, documents: Vec<RawDocument>) -> AppResult<IngestResult> {
        if documents.is_empty() || documents.iter().any(|d| d.text.trim().is_empty()) {
            return Err(AppError::NoContent);
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &documents {
            let contents = self.chunker.chunk(&document.text).await?;
            info!(
                source = %document.source,
                characters = document.text.len(),
                chunks = contents.len(),
                "Chunked document"
            );
            chunks.extend(
                contents
                    .into_iter()
                    .enumerate()
                    .map(|(index, content)| Chunk::new(content, document.source.as_str(), index)),
            );
        }
        if chunks.is_empty() {
            return Err(AppError::NoContent);
        }

        let committed = self.write_chunks(&chunks).await?;
        info!(
            documents = documents.len(),
            chunks_added = committed,
            "Ingestion complete"
        );
        Ok(IngestResult {
            chunks_added: committed,
        })
    }

    async fn write_chunks(&self, chunks: &[Chunk]) -> AppResult<usize> {
        let _guard = self.write_lock.lock().await;

        let limiter = Quota::with_period(self.settings.batch_pause).map(RateLimiter::direct);
        let total = chunks.len();
        let mut committed = 0;

        for batch in chunks.chunks(self.settings.batch_size) {
            if let Some(limiter) = &limiter {
                limiter.until_ready().await;
            }

            if let Err(e) = self.write_batch(batch).await {
                error!(committed, total, error = %e, "Batch write failed; stopping ingestion");
                return Err(AppError::PartialIngest {
                    committed,
                    source: Box::new(e),
                });
            }

            info!(
                from = committed,
                to = committed + batch.len(),
                total,
                "Committed batch"
            );
            committed += batch.len();
        }

        Ok(committed)
    }

    async fn write_batch(&self, batch: &[Chunk]) -> AppResult<()> {
        let contents: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_documents(&contents).await?;
        if embeddings.len() != batch.len() {
            return Err(AppError::external(
                "embedding",
                format!("expected {} embeddings, got {}", batch.len(), embeddings.len()),
            ));
        }

        let vectors: Vec<StoredVector> = batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredVector::from_chunk(chunk, embedding))
            .collect();
        self.store.upsert(&vectors).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::{Notify, Semaphore};

    use crate::llm::LLM;
    use crate::models::Query;
    use crate::pipeline::{RagContext, RagSettings};
    use crate::storage::{LocalVectorStore, ScoredVector, VectorStore};
    use crate::testing::*;
    use crate::types::AppError;

    use super::*;

    /// In-memory store that logs every write and holds the first upsert
    /// until `gate` gets a permit.
    struct GatedStore {
        inner: LocalVectorStore,
        entered: Notify,
        gate: Semaphore,
        events: Mutex<Vec<String>>,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: LocalVectorStore::in_memory("gated"),
                entered: Notify::new(),
                gate: Semaphore::new(0),
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VectorStore for GatedStore {
        async fn upsert(&self, vectors: &[StoredVector]) -> AppResult<()> {
            let first = {
                let mut events = self.events.lock().unwrap();
                events.push(format!("upsert {}", vectors[0].metadata["source"]));
                events.len() == 1
            };
            if first {
                self.entered.notify_one();
                self.gate.acquire().await.unwrap().forget();
            }
            tokio::task::yield_now().await;
            self.inner.upsert(vectors).await
        }

        async fn search(&self, embedding: &[f32], top_k: usize) -> AppResult<Vec<ScoredVector>> {
            self.inner.search(embedding, top_k).await
        }

        async fn count(&self) -> AppResult<usize> {
            self.inner.count().await
        }

        async fn delete_collection(&self) -> AppResult<bool> {
            self.events.lock().unwrap().push("delete".to_string());
            self.inner.delete_collection().await
        }
    }

    fn gated_context(store: Arc<GatedStore>) -> RagContext {
        RagContext::builder()
            .embedder(Arc::new(HashEmbedder::default()))
            .chunker(Arc::new(SentenceChunker))
            .store(store)
            .llm(LLM::from_adapter("test", Arc::new(ContextEchoAdapter::default())))
            .settings(RagSettings {
                batch_size: 1,
                ..test_settings()
            })
            .build()
            .unwrap()
    }

    fn sentence_context(embedder: Arc<HashEmbedder>, batch_size: usize) -> RagContext {
        RagContext::builder()
            .embedder(embedder)
            .chunker(Arc::new(SentenceChunker))
            .store(Arc::new(LocalVectorStore::in_memory("test")))
            .llm(LLM::from_adapter("test", Arc::new(ContextEchoAdapter::default())))
            .settings(RagSettings {
                batch_size,
                ..test_settings()
            })
            .build()
            .unwrap()
    }

    fn doc(text: &str, source: &str) -> RawDocument {
        RawDocument {
            text: text.to_string(),
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn test_count_grows_by_chunks_added() {
        let context = test_context();
        let first = context
            .ingest_documents(vec![doc(&azuria_document(), "azuria.txt")])
            .await
            .unwrap();
        assert!(first.chunks_added >= 1);
        assert_eq!(context.count().await.unwrap(), first.chunks_added);

        let second = context
            .ingest_documents(vec![doc("A short note. It has two sentences.", "note.md")])
            .await
            .unwrap();
        assert_eq!(
            context.count().await.unwrap(),
            first.chunks_added + second.chunks_added
        );
    }

    #[tokio::test]
    async fn test_chunk_ids_unique_and_indices_contiguous() {
        let context = sentence_context(Arc::new(HashEmbedder::default()), 50);
        let text = "One fact. Two facts. Three facts. Four facts.";
        context.ingest_documents(vec![doc(text, "a.txt")]).await.unwrap();
        context
            .ingest_documents(vec![doc(text, "a.txt"), doc("Fifth. Sixth.", "b.txt")])
            .await
            .unwrap();

        let stored = context.store().search(&HashEmbedder::embed("facts"), 100).await.unwrap();
        assert_eq!(stored.len(), 10);

        let ids: HashSet<&str> = stored.iter().map(|s| s.vector.id.as_str()).collect();
        assert_eq!(ids.len(), 10);

        let mut b_indices: Vec<usize> = stored
            .iter()
            .map(|s| s.vector.to_chunk())
            .filter(|c| c.source == "b.txt")
            .map(|c| c.index)
            .collect();
        b_indices.sort();
        assert_eq!(b_indices, vec![0, 1]);

        let a_indices: Vec<usize> = stored
            .iter()
            .map(|s| s.vector.to_chunk())
            .filter(|c| c.source == "a.txt")
            .map(|c| c.index)
            .collect();
        for i in 0..4 {
            assert_eq!(a_indices.iter().filter(|&&x| x == i).count(), 2);
        }
    }

    #[tokio::test]
    async fn test_batches_are_bounded() {
        let embedder = Arc::new(HashEmbedder::default());
        let context = sentence_context(embedder.clone(), 2);
        let result = context
            .ingest_documents(vec![doc("A. B. C. D. E.", "letters.txt")])
            .await
            .unwrap();

        assert_eq!(result.chunks_added, 5);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_batch_reports_committed_chunks() {
        let embedder = Arc::new(HashEmbedder::failing_after(2));
        let context = sentence_context(embedder, 2);
        let err = context
            .ingest_documents(vec![doc("A. B. C. D. E.", "letters.txt")])
            .await
            .unwrap_err();

        match err {
            AppError::PartialIngest { committed, source } => {
                assert_eq!(committed, 4);
                assert!(source.to_string().contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(context.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_empty_document_writes_nothing() {
        let context = test_context();
        let result = context
            .ingest_documents(vec![doc("Real text here.", "ok.txt"), doc("  \n ", "blank.txt")])
            .await;
        assert!(matches!(result, Err(AppError::NoContent)));
        assert_eq!(context.count().await.unwrap(), 0);

        let result = context.ingest_documents(Vec::new()).await;
        assert!(matches!(result, Err(AppError::NoContent)));
    }

    #[tokio::test]
    async fn test_chunker_failure_writes_nothing() {
        let context = test_context_with(
            Arc::new(HashEmbedder::failing()),
            Arc::new(ContextEchoAdapter::default()),
        );
        let result = context
            .ingest_documents(vec![doc("First sentence. Second sentence.", "a.txt")])
            .await;
        assert!(matches!(result, Err(AppError::ExternalService { .. })));
        assert_eq!(context.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingest_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("azuria.txt"), azuria_document()).unwrap();
        std::fs::write(temp_dir.path().join("extra.md"), "# Notes\n\nRivers flow north.").unwrap();

        let context = test_context();
        let result = context.ingest(temp_dir.path()).await.unwrap();
        assert_eq!(context.count().await.unwrap(), result.chunks_added);

        let answer = context
            .answer(&Query::from("What is the capital of Azuria?"), None)
            .await
            .unwrap();
        assert!(answer.text.contains("Korrun"));
    }

    #[tokio::test]
    async fn test_throttle_spaces_batches() {
        let context = RagContext::builder()
            .embedder(Arc::new(HashEmbedder::default()))
            .chunker(Arc::new(SentenceChunker))
            .store(Arc::new(LocalVectorStore::in_memory("test")))
            .llm(LLM::from_adapter("test", Arc::new(ContextEchoAdapter::default())))
            .settings(RagSettings {
                batch_size: 1,
                batch_pause: std::time::Duration::from_millis(40),
                ..RagSettings::default()
            })
            .build()
            .unwrap();

        let started = std::time::Instant::now();
        context
            .ingest_documents(vec![doc("One. Two. Three.", "t.txt")])
            .await
            .unwrap();
        assert!(started.elapsed() >= std::time::Duration::from_millis(70));
    }

    #[tokio::test]
    async fn test_reset_waits_for_write_phase() {
        let store = Arc::new(GatedStore::new());
        let context = Arc::new(gated_context(store.clone()));

        let ingest = tokio::spawn({
            let context = context.clone();
            async move { context.ingest_documents(vec![doc("One. Two. Three.", "a.txt")]).await }
        });
        store.entered.notified().await;

        let reset = tokio::spawn({
            let context = context.clone();
            async move { context.reset().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reset.is_finished());

        store.gate.add_permits(1);
        assert_eq!(ingest.await.unwrap().unwrap().chunks_added, 3);
        assert!(reset.await.unwrap().unwrap());

        assert_eq!(
            store.events(),
            vec!["upsert a.txt", "upsert a.txt", "upsert a.txt", "delete"]
        );
        assert_eq!(context.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_ingestions_do_not_interleave() {
        let store = Arc::new(GatedStore::new());
        store.gate.add_permits(1);
        let context = gated_context(store.clone());

        let (a, b) = tokio::join!(
            context.ingest_documents(vec![doc("A one. A two. A three.", "a.txt")]),
            context.ingest_documents(vec![doc("B one. B two. B three.", "b.txt")]),
        );
        a.unwrap();
        b.unwrap();

        let events = store.events();
        let a_run = vec!["upsert a.txt"; 3];
        let b_run = vec!["upsert b.txt"; 3];
        assert!(
            events == [a_run.clone(), b_run.clone()].concat() || events == [b_run, a_run].concat(),
            "{events:?}"
        );
        assert_eq!(context.count().await.unwrap(), 6);
    }
}
