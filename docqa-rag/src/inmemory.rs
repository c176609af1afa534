//! In-memory vector store with exact nearest-neighbor search.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and corpora small enough for a linear scan.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{IndexEntry, RetrievalResult, SearchResult};
use crate::error::Result;
use crate::similarity::{SimilarityMetric, rank};
use crate::vectorstore::{VectorStore, validate_dimensions, validate_query};

/// An in-memory vector store scoring every entry on each search.
///
/// Entries are stored as chunk ID → entry. All operations are async-safe
/// via `tokio::sync::RwLock`; a batch upsert is applied under one write
/// lock, so readers never observe half of a batch.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, SimilarityMetric};
///
/// let store = InMemoryVectorStore::new(384, SimilarityMetric::Cosine);
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimensions: usize,
    metric: SimilarityMetric,
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl InMemoryVectorStore {
    /// Create a new empty store for `dimensions`-length vectors.
    pub fn new(dimensions: usize, metric: SimilarityMetric) -> Self {
        Self::with_entries(dimensions, metric, HashMap::new())
    }

    pub(crate) fn with_entries(
        dimensions: usize,
        metric: SimilarityMetric,
        entries: HashMap<String, IndexEntry>,
    ) -> Self {
        Self { dimensions, metric, entries: RwLock::new(entries) }
    }

    /// A copy of every stored entry, ordered by chunk ID.
    pub async fn snapshot(&self) -> Vec<IndexEntry> {
        let entries = self.entries.read().await;
        let mut all: Vec<IndexEntry> = entries.values().cloned().collect();
        all.sort_by(|a, b| a.chunk.id.cmp(&b.chunk.id));
        all
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    async fn upsert_batch(&self, batch: &[IndexEntry]) -> Result<()> {
        validate_dimensions(self.dimensions, batch)?;
        let mut entries = self.entries.write().await;
        for entry in batch {
            entries.insert(entry.chunk.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        threshold: Option<f32>,
    ) -> Result<RetrievalResult> {
        validate_query(self.dimensions, embedding)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let scored: Vec<SearchResult> = entries
            .values()
            .map(|entry| SearchResult {
                chunk: entry.chunk.clone(),
                score: self.metric.score(&entry.embedding, embedding),
            })
            .collect();
        drop(entries);

        Ok(rank(scored, top_k, threshold))
    }

    async fn delete(&self, document_id: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.chunk.document_id != document_id);
        Ok(before - entries.len())
    }

    async fn delete_entries(&self, chunk_ids: &[&str]) -> Result<usize> {
        let mut entries = self.entries.write().await;
        Ok(chunk_ids.iter().filter(|id| entries.remove(**id).is_some()).count())
    }

    async fn document_entries(&self, document_id: &str) -> Result<Vec<IndexEntry>> {
        let entries = self.entries.read().await;
        let mut found: Vec<IndexEntry> =
            entries.values().filter(|e| e.chunk.document_id == document_id).cloned().collect();
        found.sort_by_key(|e| e.chunk.sequence_index);
        Ok(found)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::Chunk;
    use crate::error::RagError;

    fn entry(doc: &str, seq: usize, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry::new(
            Chunk {
                id: Chunk::make_id(doc, seq),
                document_id: doc.into(),
                text: format!("{doc} chunk {seq}"),
                offset_start: seq * 10,
                offset_end: seq * 10 + 10,
                sequence_index: seq,
                metadata: HashMap::new(),
            },
            embedding,
        )
    }

    #[tokio::test]
    async fn search_on_empty_store_is_empty() {
        let store = InMemoryVectorStore::new(2, SimilarityMetric::Cosine);
        assert!(store.search(&[1.0, 0.0], 3, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_with_zero_k_is_empty() {
        let store = InMemoryVectorStore::new(2, SimilarityMetric::Cosine);
        store.upsert(entry("a", 0, vec![1.0, 0.0])).await.unwrap();
        assert!(store.search(&[1.0, 0.0], 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exact_vector_is_returned_first_at_max_similarity() {
        let store = InMemoryVectorStore::new(3, SimilarityMetric::Cosine);
        store
            .upsert_batch(&[entry("a", 0, vec![0.1, 0.9, 0.0]), entry("b", 0, vec![0.7, 0.7, 0.1])])
            .await
            .unwrap();
        let results = store.search(&[0.7, 0.7, 0.1], 2, None).await.unwrap();
        assert_eq!(results[0].chunk.id, "b_0");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_replaces_by_chunk_id() {
        let store = InMemoryVectorStore::new(2, SimilarityMetric::Cosine);
        store.upsert(entry("a", 0, vec![1.0, 0.0])).await.unwrap();
        store.upsert(entry("a", 0, vec![0.0, 1.0])).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
        let results = store.search(&[0.0, 1.0], 1, None).await.unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn dimension_mismatch_blocks_the_whole_batch() {
        let store = InMemoryVectorStore::new(2, SimilarityMetric::Cosine);
        let err = store
            .upsert_batch(&[entry("a", 0, vec![1.0, 0.0]), entry("a", 1, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexCorruption(_)));
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn non_finite_embeddings_are_refused() {
        let store = InMemoryVectorStore::new(2, SimilarityMetric::Cosine);
        store.upsert(entry("a", 0, vec![1.0, 0.0])).await.unwrap();

        for bad in [vec![f32::NAN, 0.0], vec![f32::INFINITY, 1.0]] {
            let err = store.upsert(entry("z", 0, bad.clone())).await.unwrap_err();
            assert!(matches!(err, RagError::IndexCorruption(_)));
            let err = store.search(&bad, 2, None).await.unwrap_err();
            assert!(matches!(err, RagError::IndexCorruption(_)));
        }

        let results = store.search(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "a_0");
    }

    #[tokio::test]
    async fn delete_removes_only_that_document() {
        let store = InMemoryVectorStore::new(2, SimilarityMetric::Cosine);
        store
            .upsert_batch(&[
                entry("a", 0, vec![1.0, 0.0]),
                entry("a", 1, vec![1.0, 0.0]),
                entry("b", 0, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.delete("a").await.unwrap(), 2);
        assert_eq!(store.delete("a").await.unwrap(), 0);
        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.delete_entries(&["b_0", "missing"]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn document_entries_are_in_sequence_order() {
        let store = InMemoryVectorStore::new(1, SimilarityMetric::InnerProduct);
        store
            .upsert_batch(&[entry("a", 2, vec![1.0]), entry("a", 0, vec![1.0]), entry("a", 1, vec![1.0])])
            .await
            .unwrap();
        let seqs: Vec<usize> =
            store.document_entries("a").await.unwrap().iter().map(|e| e.chunk.sequence_index).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
