//! Embedder trait for generating vector embeddings from text.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// A provider that generates fixed-dimension vector embeddings from text.
///
/// Implementations wrap specific embedding backends (Ollama, OpenAI, etc.)
/// behind a unified async interface. The default [`embed_batch`](Embedder::embed_batch)
/// implementation calls [`embed`](Embedder::embed) sequentially;
/// backends that support native batching should override it.
///
/// Failures to reach the model service are reported as
/// [`RagError::EmbeddingUnavailable`](crate::RagError::EmbeddingUnavailable).
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::Embedder;
///
/// let embedder = MyEmbedder::new();
/// let embedding = embedder.embed("hello world").await?;
/// assert_eq!(embedding.len(), embedder.dimensions());
/// ```
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// Returns one embedding per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Identifier of the embedding model. Embeddings from different models
    /// must never share an index.
    fn model_id(&self) -> &str;
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "has",
    "have", "how", "in", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was",
    "were", "what", "when", "where", "which", "who", "why", "with",
];

/// Stands in for the tokens of a text that has none left after filtering.
/// Not alphanumeric, so no real token can collide with it.
const EMPTY_TOKEN: &str = "\u{0}";

/// A deterministic, offline embedder based on feature hashing.
///
/// Lowercased alphanumeric tokens (minus a small stopword list) are hashed
/// with SHA-256 into `dimensions` buckets; the bucket counts are
/// L2-normalized. Texts sharing vocabulary get positive cosine similarity.
/// Text with no tokens left (punctuation, stopwords only) maps to a fixed
/// unit vector, so every embedding has unit length.
/// The same text always yields bit-identical vectors, on every platform.
///
/// Useful for tests, demos, and air-gapped indexing where lexical matching
/// is good enough.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashEmbedder {
    /// Create a hash embedder producing `dimensions`-length vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1), model_id: format!("hash-{}", dimensions.max(1)) }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(prefix) % self.dimensions as u64) as usize
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let mut seen = false;
        for token in Self::tokens(text) {
            embedding[self.bucket(&token)] += 1.0;
            seen = true;
        }
        if !seen {
            embedding[self.bucket(EMPTY_TOKEN)] = 1.0;
        }
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::SimilarityMetric;

    #[tokio::test]
    async fn identical_text_yields_identical_vectors() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("Revenue grew 25% in North America").await.unwrap();
        let b = embedder.embed("Revenue grew 25% in North America").await.unwrap();
        let a_bits: Vec<u32> = a.iter().map(|x| x.to_bits()).collect();
        let b_bits: Vec<u32> = b.iter().map(|x| x.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn batch_matches_single_calls_in_order() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed_batch(&["alpha beta", "gamma"]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("alpha beta").await.unwrap());
        assert_eq!(batch[1], embedder.embed("gamma").await.unwrap());
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed("north america revenue").await.unwrap();
        let related = embedder.embed("Revenue in North America").await.unwrap();
        let unrelated = embedder.embed("quarterly hiring plan").await.unwrap();
        let metric = SimilarityMetric::Cosine;
        assert!(metric.score(&query, &related) > metric.score(&query, &unrelated));
    }

    #[tokio::test]
    async fn text_without_tokens_still_has_unit_length() {
        let embedder = HashEmbedder::new(8);
        for text in ["how did the", "The.", "", "?!"] {
            let v = embedder.embed(text).await.unwrap();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-6, "{text:?} embedded with norm {norm}");
        }
    }

    #[tokio::test]
    async fn stopword_only_chunk_is_its_own_best_match() {
        use crate::document::{Chunk, IndexEntry};
        use crate::inmemory::InMemoryVectorStore;
        use crate::vectorstore::VectorStore;

        let embedder = HashEmbedder::new(64);
        let store = InMemoryVectorStore::new(64, SimilarityMetric::Cosine);
        for (doc, text) in [("a", "Revenue grew in North America."), ("b", "The.")] {
            let chunk = Chunk {
                id: Chunk::make_id(doc, 0),
                document_id: doc.into(),
                text: text.into(),
                offset_start: 0,
                offset_end: text.len(),
                sequence_index: 0,
                metadata: Default::default(),
            };
            store.upsert(IndexEntry::new(chunk, embedder.embed(text).await.unwrap())).await.unwrap();
        }

        let results = store.search(&embedder.embed("The.").await.unwrap(), 2, None).await.unwrap();
        assert_eq!(results[0].chunk.id, "b_0");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }
}
