//! Query-time retrieval: embed the query, search the store, rank.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::document::RetrievalResult;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::retry::with_timeout;
use crate::similarity::rank;
use crate::vectorstore::VectorStore;

/// Produces ranked, thresholded chunks for a query.
///
/// The query embedding is computed once with no retries: an unavailable
/// embedder is reported to the caller rather than masked. Results from the
/// store are re-ranked with [`rank_order`](crate::similarity::rank_order),
/// cut at the threshold, and truncated to `k`, so output is deterministic
/// even for backends that do not break ties.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    embed_timeout: Duration,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, embed_timeout: Duration) -> Self {
        Self { embedder, store, embed_timeout }
    }

    /// Retrieve at most `k` chunks scoring at least `threshold`.
    ///
    /// `k == 0` returns an empty result without calling the embedder.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingUnavailable`] if the query cannot be embedded
    ///   within the embedding timeout.
    /// - Any error from the vector store search.
    pub async fn retrieve(&self, query: &str, k: usize, threshold: Option<f32>) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let timeout = self.embed_timeout;
        let provider = self.embedder.model_id().to_string();
        let embedding = with_timeout(timeout, self.embedder.embed(query), || {
            RagError::EmbeddingUnavailable {
                provider,
                message: format!("query embedding timed out after {} ms", timeout.as_millis()),
            }
        })
        .await
        .inspect_err(|e| error!(error = %e, "query embedding failed"))?;

        let results = self.store.search(&embedding, k, threshold).await?;
        let ranked = rank(results, k, threshold);
        debug!(k, ?threshold, result_count = ranked.len(), "retrieved chunks");
        Ok(ranked)
    }
}
