use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::chunker::TextChunker;
use crate::embedding::{embed_texts, Embedder};
use crate::error::Result;
use crate::store::{ChunkRecord, VectorStore};

/// Outcome of indexing one page.
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub source_url: String,
    pub chunks_processed: usize,
}

/// Turns one page's text into embedded, stored chunks.
///
/// Chunk identity is a deterministic function of (source URL, chunk index),
/// so indexing the same page again overwrites the previous rows instead of
/// inserting duplicates. A page is committed all-or-nothing: one failed
/// embedding fails the whole call and nothing is written.
pub struct IndexingPipeline {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    embed_concurrency: usize,
}

impl IndexingPipeline {
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        embed_concurrency: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            embed_concurrency,
        }
    }

    pub async fn index(&self, source_url: &str, text: &str) -> Result<IndexOutcome> {
        let chunks = self.chunker.split(text);

        if chunks.is_empty() {
            return Ok(IndexOutcome {
                source_url: source_url.to_string(),
                chunks_processed: 0,
            });
        }

        let embeddings = embed_texts(self.embedder.as_ref(), &chunks, self.embed_concurrency)
            .await?;

        let content_hash = hash_hex(text);
        let url_key = source_key(source_url);

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (content, embedding))| ChunkRecord {
                id: format!("{url_key}-{index}"),
                source_url: source_url.to_string(),
                chunk_index: index as i32,
                content,
                content_hash: content_hash.clone(),
                embedding,
            })
            .collect();

        let chunks_processed = records.len();

        // Single batched upsert; no partial commit on embedding failure
        self.store.upsert(&records).await?;

        tracing::debug!(url = source_url, chunks = chunks_processed, "indexed page");

        Ok(IndexOutcome {
            source_url: source_url.to_string(),
            chunks_processed,
        })
    }
}

/// Stable per-source key: sha256 hex prefix of the URL, filter-safe in store
/// predicates regardless of what characters the URL contains.
fn source_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

fn hash_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::store::testing::{MemoryStore, StubEmbedder};

    fn pipeline(store: Arc<MemoryStore>) -> IndexingPipeline {
        IndexingPipeline::new(
            TextChunker::new(1000, 200).unwrap(),
            Arc::new(StubEmbedder::default()),
            store,
            4,
        )
    }

    #[test]
    fn test_source_key_is_deterministic() {
        let a = source_key("https://example.com/docs?page=1");
        let b = source_key("https://example.com/docs?page=1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, source_key("https://example.com/docs?page=2"));
    }

    #[tokio::test]
    async fn test_index_counts_chunks() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(store.clone());

        let text = "a".repeat(1200);
        let outcome = pipeline
            .index("https://example.com/long", &text)
            .await
            .unwrap();

        assert_eq!(outcome.chunks_processed, 2);
        assert_eq!(outcome.source_url, "https://example.com/long");
        assert_eq!(store.chunk_count(), 2);
    }

    #[tokio::test]
    async fn test_reindexing_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(store.clone());

        let text = "b".repeat(1500);
        pipeline.index("https://example.com/p", &text).await.unwrap();
        let first_ids = store.ids();

        pipeline.index("https://example.com/p", &text).await.unwrap();
        let second_ids = store.ids();

        assert_eq!(first_ids, second_ids);
        assert_eq!(store.chunk_count(), first_ids.len());
    }

    #[tokio::test]
    async fn test_empty_text_indexes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(store.clone());

        let outcome = pipeline.index("https://example.com/empty", "  \n ").await.unwrap();
        assert_eq!(outcome.chunks_processed, 0);
        assert_eq!(store.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_one_embedding_failure_fails_the_page() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = IndexingPipeline::new(
            TextChunker::new(100, 20).unwrap(),
            Arc::new(StubEmbedder::failing_on("poison")),
            store.clone(),
            4,
        );

        let mut text = "calm ordinary text. ".repeat(10);
        text.push_str("poison in the middle. ");
        text.push_str(&"more ordinary text. ".repeat(10));

        let err = pipeline.index("https://example.com/bad", &text).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        // No partial commit
        assert_eq!(store.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = Arc::new(MemoryStore::failing());
        let pipeline = pipeline(store);
        let err = pipeline
            .index("https://example.com/p", "some content here")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Store(_)));
    }
}
