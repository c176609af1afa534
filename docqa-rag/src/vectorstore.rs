//! Vector store trait for storing and searching chunk embeddings.

use async_trait::async_trait;

use crate::document::{IndexEntry, RetrievalResult};
use crate::error::{RagError, Result};
use crate::similarity::SimilarityMetric;

/// A storage backend for [`IndexEntry`] records with similarity search.
///
/// One store instance holds vectors of exactly one dimensionality, scored
/// with exactly one [`SimilarityMetric`]. Entries are keyed by chunk ID:
/// upserting an existing ID replaces the prior entry.
///
/// Implementations must be safe under concurrent calls and must take any
/// internal lock only for the duration of a single method call.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, SimilarityMetric, VectorStore};
///
/// let store = InMemoryVectorStore::new(384, SimilarityMetric::Cosine);
/// store.upsert_batch(&entries).await?;
/// let results = store.search(&query_embedding, 5, Some(0.3)).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Dimensionality every stored embedding must have.
    fn dimensions(&self) -> usize;

    /// The metric used by [`search`](VectorStore::search).
    fn metric(&self) -> SimilarityMetric;

    /// Insert or replace one entry.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexCorruption`] if the embedding length differs
    /// from [`dimensions`](VectorStore::dimensions); nothing is written.
    async fn upsert(&self, entry: IndexEntry) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(&entry)).await
    }

    /// Insert or replace a batch of entries.
    ///
    /// The whole batch is validated before anything is written.
    async fn upsert_batch(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Return up to `top_k` entries most similar to `embedding`, ordered by
    /// [`rank_order`](crate::similarity::rank_order). Entries scoring below
    /// `threshold` are excluded. `top_k == 0` and an empty store both yield
    /// an empty result.
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        threshold: Option<f32>,
    ) -> Result<RetrievalResult>;

    /// Delete every entry of a document. Returns the number removed.
    async fn delete(&self, document_id: &str) -> Result<usize>;

    /// Delete entries by chunk ID. Unknown IDs are ignored. Returns the
    /// number removed.
    async fn delete_entries(&self, chunk_ids: &[&str]) -> Result<usize>;

    /// All entries of a document, ordered by sequence index.
    async fn document_entries(&self, document_id: &str) -> Result<Vec<IndexEntry>>;

    /// Total number of stored entries.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Check every embedding in `entries` against `dimensions`, and that every
/// component is finite.
pub fn validate_dimensions(dimensions: usize, entries: &[IndexEntry]) -> Result<()> {
    for entry in entries {
        if entry.embedding.len() != dimensions {
            return Err(RagError::IndexCorruption(format!(
                "chunk '{}': expected {dimensions}-dimensional embedding, got {}",
                entry.chunk_id(),
                entry.embedding.len()
            )));
        }
        if !entry.embedding.iter().all(|x| x.is_finite()) {
            return Err(RagError::IndexCorruption(format!(
                "chunk '{}': embedding contains NaN or infinite values",
                entry.chunk_id()
            )));
        }
    }
    Ok(())
}

/// Check a query vector before it is scored against stored entries.
pub fn validate_query(dimensions: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != dimensions {
        return Err(RagError::dimension_mismatch(dimensions, embedding.len()));
    }
    if !embedding.iter().all(|x| x.is_finite()) {
        return Err(RagError::IndexCorruption(
            "query embedding contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}
