use arrow_array::{Array, Float32Array, Int32Array, RecordBatch, StringArray};
use arrow_array::{FixedSizeListArray, TimestampMillisecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::{
    connect,
    query::{ExecutableQuery, QueryBase},
    Connection, DistanceType,
};
use std::path::Path;
use std::sync::Arc;

use crate::error::{RagError, Result};

const TABLE_NAME: &str = "chunks";

/// One embedded chunk as persisted in the vector store.
///
/// `id` is a deterministic function of (source URL, chunk index), so storing
/// the same page again overwrites instead of duplicating.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub source_url: String,
    pub chunk_index: i32,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// A retrieved chunk with its distance to the query vector. Request-scoped,
/// never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub content: String,
    pub source_url: String,
    /// Cosine distance: 0 is identical, lower is more relevant.
    pub distance: f32,
}

impl RetrievalResult {
    /// Display-layer relevance derived from the cosine distance.
    pub fn relevance_score(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Aggregate statistics over the stored chunks.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_sources: usize,
    pub total_chunks: usize,
    pub oldest_indexed: Option<DateTime<Utc>>,
    pub newest_indexed: Option<DateTime<Utc>>,
}

/// One indexed source URL with its chunk count and recency.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub url: String,
    pub chunk_count: usize,
    pub indexed_at: DateTime<Utc>,
}

/// Capability for persisting embedded chunks and running similarity queries.
///
/// The store owns chunk lifetimes after upsert; it must tolerate concurrent
/// reads during an active crawl.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert-or-overwrite a batch of records keyed by their ids.
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()>;

    /// Nearest-neighbor search; results ordered by ascending distance.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>>;

    /// Remove every chunk stored for one source URL.
    async fn delete_source(&self, url: &str) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;

    async fn list_sources(&self, limit: Option<usize>) -> Result<Vec<SourceInfo>>;
}

/// LanceDB-backed store: one `chunks` table with a fixed-size embedding
/// column, cosine distance for search.
pub struct LanceStore {
    db: Connection,
    vector_dim: usize,
}

impl LanceStore {
    fn quote_filter_string(input: &str) -> String {
        input.replace('\'', "''")
    }

    pub async fn new(path: &Path, vector_dim: usize) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| RagError::Store(format!("cannot create index dir: {e}")))?;
        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::Store("non-UTF-8 index path".to_string()))?;

        let db = connect(path_str)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("cannot open index: {e}")))?;

        let store = Self { db, vector_dim };
        store.initialize_table().await?;

        Ok(store)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source_url", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new(
                "indexed_at",
                DataType::Timestamp(TimeUnit::Millisecond, None),
                false,
            ),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.vector_dim as i32,
                ),
                false,
            ),
        ]))
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;

        if !table_names.contains(&TABLE_NAME.to_string()) {
            use arrow::record_batch::RecordBatchIterator;
            use std::iter::once;

            let schema = self.schema();
            let empty_batch = RecordBatch::new_empty(schema.clone());
            let batches = once(Ok(empty_batch));
            let batch_reader = RecordBatchIterator::new(batches, schema);
            self.db
                .create_table(TABLE_NAME, batch_reader)
                .execute()
                .await
                .map_err(|e| RagError::Store(e.to_string()))?;
        }

        Ok(())
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        let table_names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;
        if !table_names.contains(&TABLE_NAME.to_string()) {
            return Err(RagError::NotInitialized(
                "chunk table does not exist yet".to_string(),
            ));
        }
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Store(e.to_string()))
    }

    fn build_batch(&self, records: &[ChunkRecord], now_millis: i64) -> Result<RecordBatch> {
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let source_urls: Vec<&str> = records.iter().map(|r| r.source_url.as_str()).collect();
        let chunk_indices: Vec<i32> = records.iter().map(|r| r.chunk_index).collect();
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        let content_hashes: Vec<&str> = records.iter().map(|r| r.content_hash.as_str()).collect();
        let indexed_ats: Vec<i64> = records.iter().map(|_| now_millis).collect();

        let embedding_values: Vec<f32> = records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();
        let embedding_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.vector_dim as i32,
            Arc::new(Float32Array::from(embedding_values)),
            None,
        )
        .map_err(|e| RagError::Store(format!("bad embedding batch: {e}")))?;

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(source_urls)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(content_hashes)),
                Arc::new(TimestampMillisecondArray::from(indexed_ats)),
                Arc::new(embedding_array),
            ],
        )
        .map_err(|e| RagError::Store(e.to_string()))
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        for record in records {
            if record.embedding.len() != self.vector_dim {
                return Err(RagError::Store(format!(
                    "embedding dimension {} does not match index dimension {}",
                    record.embedding.len(),
                    self.vector_dim
                )));
            }
        }

        let table = self.open_table().await?;

        // Overwrite semantics: drop any rows with the same ids, then insert
        // the new batch
        let id_list = records
            .iter()
            .map(|r| format!("'{}'", Self::quote_filter_string(&r.id)))
            .collect::<Vec<_>>()
            .join(", ");
        table
            .delete(&format!("id IN ({id_list})"))
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;

        let batch = self.build_batch(records, Utc::now().timestamp_millis())?;

        use arrow::record_batch::RecordBatchIterator;
        use std::iter::once;
        let batches = once(Ok(batch.clone()));
        let batch_reader = RecordBatchIterator::new(batches, batch.schema());
        table
            .add(batch_reader)
            .execute()
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let table = self.open_table().await?;

        let query = table
            .vector_search(vector)
            .map_err(|e| RagError::Store(e.to_string()))?
            .distance_type(DistanceType::Cosine)
            .limit(k);

        let mut results = query
            .execute()
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;
        let mut retrieved = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Store(e.to_string()))?
        {
            if batch.num_rows() == 0 {
                continue;
            }

            let contents = string_column(&batch, "content")?;
            let source_urls = string_column(&batch, "source_url")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>().cloned())
                .ok_or_else(|| RagError::Store("missing _distance column".to_string()))?;

            for i in 0..batch.num_rows() {
                retrieved.push(RetrievalResult {
                    content: contents.value(i).to_string(),
                    source_url: source_urls.value(i).to_string(),
                    distance: distances.value(i),
                });
            }
        }

        Ok(retrieved)
    }

    async fn delete_source(&self, url: &str) -> Result<()> {
        let table = self.open_table().await?;
        table
            .delete(&format!(
                "source_url = '{}'",
                Self::quote_filter_string(url)
            ))
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;

        if count == 0 {
            return Ok(StoreStats {
                total_sources: 0,
                total_chunks: 0,
                oldest_indexed: None,
                newest_indexed: None,
            });
        }

        let results = table
            .query()
            .execute()
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;

        let mut unique_urls = std::collections::HashSet::new();
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;

        for batch in batches {
            let source_urls = string_column(&batch, "source_url")?;
            let indexed_ats = timestamp_column(&batch, "indexed_at")?;

            for i in 0..batch.num_rows() {
                unique_urls.insert(source_urls.value(i).to_string());

                if let Some(indexed) = DateTime::from_timestamp_millis(indexed_ats.value(i)) {
                    if oldest.is_none_or(|old| indexed < old) {
                        oldest = Some(indexed);
                    }
                    if newest.is_none_or(|new| indexed > new) {
                        newest = Some(indexed);
                    }
                }
            }
        }

        Ok(StoreStats {
            total_sources: unique_urls.len(),
            total_chunks: count,
            oldest_indexed: oldest,
            newest_indexed: newest,
        })
    }

    async fn list_sources(&self, limit: Option<usize>) -> Result<Vec<SourceInfo>> {
        let table = self.open_table().await?;
        let results = table
            .query()
            .execute()
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;

        let mut sources: std::collections::HashMap<String, (usize, DateTime<Utc>)> =
            std::collections::HashMap::new();

        for batch in batches {
            let source_urls = string_column(&batch, "source_url")?;
            let indexed_ats = timestamp_column(&batch, "indexed_at")?;

            for i in 0..batch.num_rows() {
                let url = source_urls.value(i).to_string();
                let indexed_at = DateTime::from_timestamp_millis(indexed_ats.value(i))
                    .ok_or_else(|| RagError::Store("invalid timestamp".to_string()))?;

                sources
                    .entry(url)
                    .and_modify(|(count, existing)| {
                        *count += 1;
                        if indexed_at > *existing {
                            *existing = indexed_at;
                        }
                    })
                    .or_insert((1, indexed_at));
            }
        }

        let mut result: Vec<SourceInfo> = sources
            .into_iter()
            .map(|(url, (chunk_count, indexed_at))| SourceInfo {
                url,
                chunk_count,
                indexed_at,
            })
            .collect();

        // Most recently indexed first
        result.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));

        if let Some(limit) = limit {
            result.truncate(limit);
        }

        Ok(result)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::Store(format!("missing column {name}")))
}

fn timestamp_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a TimestampMillisecondArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
        .ok_or_else(|| RagError::Store(format!("missing column {name}")))
}

#[cfg(test)]
pub mod testing {
    //! In-memory fakes shared by the pipeline, crawler and query tests.

    use super::*;
    use async_trait::async_trait;
    use sha2::{Digest, Sha256};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Deterministic embedder: an 8-dim normalized vector derived from the
    /// sha256 of the input, so identical text always embeds identically.
    #[derive(Default)]
    pub struct StubEmbedder {
        fail_on: Option<String>,
    }

    impl StubEmbedder {
        pub fn failing_on(needle: &str) -> Self {
            Self {
                fail_on: Some(needle.to_string()),
            }
        }
    }

    #[async_trait]
    impl crate::embedding::Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if let Some(needle) = &self.fail_on {
                if text.contains(needle.as_str()) {
                    return Err(RagError::Embedding(format!(
                        "stub failure on '{needle}'"
                    )));
                }
            }

            let digest = Sha256::digest(text.as_bytes());
            let mut vector: Vec<f32> = digest[..8].iter().map(|&b| b as f32 + 1.0).collect();
            let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            for v in &mut vector {
                *v /= norm;
            }
            Ok(vector)
        }
    }

    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 {
            return 1.0;
        }
        1.0 - dot / (na * nb)
    }

    /// HashMap-backed store with brute-force cosine search.
    #[derive(Default)]
    pub struct MemoryStore {
        records: Mutex<HashMap<String, ChunkRecord>>,
        pub fail_upserts: bool,
    }

    impl MemoryStore {
        pub fn failing() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                fail_upserts: true,
            }
        }

        pub fn chunk_count(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        pub fn ids(&self) -> Vec<String> {
            let mut ids: Vec<String> =
                self.records.lock().unwrap().keys().cloned().collect();
            ids.sort();
            ids
        }
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
            if self.fail_upserts {
                return Err(RagError::Store("stub store outage".to_string()));
            }
            let mut map = self.records.lock().unwrap();
            for record in records {
                map.insert(record.id.clone(), record.clone());
            }
            Ok(())
        }

        async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
            let map = self.records.lock().unwrap();
            let mut results: Vec<RetrievalResult> = map
                .values()
                .map(|r| RetrievalResult {
                    content: r.content.clone(),
                    source_url: r.source_url.clone(),
                    distance: cosine_distance(&r.embedding, vector),
                })
                .collect();
            results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            results.truncate(k);
            Ok(results)
        }

        async fn delete_source(&self, url: &str) -> Result<()> {
            self.records
                .lock()
                .unwrap()
                .retain(|_, r| r.source_url != url);
            Ok(())
        }

        async fn stats(&self) -> Result<StoreStats> {
            let map = self.records.lock().unwrap();
            let sources: std::collections::HashSet<&str> =
                map.values().map(|r| r.source_url.as_str()).collect();
            Ok(StoreStats {
                total_sources: sources.len(),
                total_chunks: map.len(),
                oldest_indexed: None,
                newest_indexed: None,
            })
        }

        async fn list_sources(&self, limit: Option<usize>) -> Result<Vec<SourceInfo>> {
            let map = self.records.lock().unwrap();
            let mut counts: HashMap<String, usize> = HashMap::new();
            for record in map.values() {
                *counts.entry(record.source_url.clone()).or_default() += 1;
            }
            let mut sources: Vec<SourceInfo> = counts
                .into_iter()
                .map(|(url, chunk_count)| SourceInfo {
                    url,
                    chunk_count,
                    indexed_at: Utc::now(),
                })
                .collect();
            sources.sort_by(|a, b| a.url.cmp(&b.url));
            if let Some(limit) = limit {
                sources.truncate(limit);
            }
            Ok(sources)
        }
    }
}
