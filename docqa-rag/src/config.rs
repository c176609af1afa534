//! Configuration for the RAG pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;
use crate::similarity::SimilarityMetric;

/// What the generator does when a prompt carries no retrieved context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoContextPolicy {
    /// Answer with a fixed notice without calling the language model.
    #[default]
    Decline,
    /// Call the language model and prefix its answer with the notice.
    Hedge,
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Default number of chunks to retrieve per query.
    pub top_k: usize,
    /// Default minimum similarity score; results below it are excluded.
    pub similarity_threshold: f32,
    /// Maximum size of the rendered prompt, in characters.
    pub max_prompt_size: usize,
    /// Similarity metric. Must match the vector store's metric.
    pub metric: SimilarityMetric,
    /// Number of chunk texts sent per embedding call during indexing.
    pub embed_batch_size: usize,
    /// Number of documents indexed concurrently by `ingest_batch`.
    pub index_concurrency: usize,
    /// Per-call timeout for embedding requests, in milliseconds.
    pub embed_timeout_ms: u64,
    /// Per-call timeout for generation requests, in milliseconds.
    pub generation_timeout_ms: u64,
    /// Backoff policy for embedding calls during indexing.
    pub retry: RetryPolicy,
    /// Total generation attempts before a failure is reported.
    pub generation_max_attempts: u32,
    /// Behaviour when retrieval produced no usable context.
    pub no_context_policy: NoContextPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            similarity_threshold: 0.0,
            max_prompt_size: 6000,
            metric: SimilarityMetric::Cosine,
            embed_batch_size: 32,
            index_concurrency: 4,
            embed_timeout_ms: 30_000,
            generation_timeout_ms: 120_000,
            retry: RetryPolicy::default(),
            generation_max_attempts: 2,
            no_context_policy: NoContextPolicy::Decline,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `similarity_threshold` is not finite
    /// - `max_prompt_size`, `embed_batch_size`, `index_concurrency`,
    ///   `retry.max_attempts`, or `generation_max_attempts` is zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be greater than zero".to_string()));
        }
        if !self.similarity_threshold.is_finite() {
            return Err(RagError::InvalidConfig("similarity_threshold must be finite".to_string()));
        }
        for (name, value) in [
            ("max_prompt_size", self.max_prompt_size),
            ("embed_batch_size", self.embed_batch_size),
            ("index_concurrency", self.index_concurrency),
            ("retry.max_attempts", self.retry.max_attempts as usize),
            ("generation_max_attempts", self.generation_max_attempts as usize),
        ] {
            if value == 0 {
                return Err(RagError::InvalidConfig(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the default number of chunks to retrieve.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the default minimum similarity threshold.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the maximum rendered prompt size in characters.
    pub fn max_prompt_size(mut self, size: usize) -> Self {
        self.config.max_prompt_size = size;
        self
    }

    pub fn metric(mut self, metric: SimilarityMetric) -> Self {
        self.config.metric = metric;
        self
    }

    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    pub fn index_concurrency(mut self, concurrency: usize) -> Self {
        self.config.index_concurrency = concurrency;
        self
    }

    pub fn embed_timeout(mut self, timeout: Duration) -> Self {
        self.config.embed_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the backoff policy for indexing-time embedding calls.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn generation_max_attempts(mut self, attempts: u32) -> Self {
        self.config.generation_max_attempts = attempts;
        self
    }

    pub fn no_context_policy(mut self, policy: NoContextPolicy) -> Self {
        self.config.no_context_policy = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
