//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the indexing workflow (chunk → embed →
//! store) and the query workflow (retrieve → augment → generate) by
//! composing an [`Embedder`], a [`VectorStore`], a [`Chunker`], and a
//! [`Generator`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{HashEmbedder, InMemoryVectorStore, Query, RagConfig, RagPipeline, SimilarityMetric};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedder(Arc::new(HashEmbedder::new(256)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new(256, SimilarityMetric::Cosine)))
//!     .language_model(Arc::new(my_model))
//!     .build()?;
//!
//! pipeline.ingest(&document).await?;
//! let answer = pipeline.query(&Query::new("How did North America perform?")).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Answer, Chunk, Document, IndexEntry, Query, RetrievalResult};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generator::{Generator, GroundedGenerator, LanguageModel};
use crate::prompt::PromptBuilder;
use crate::retriever::Retriever;
use crate::retry::with_timeout;
use crate::source::DocumentSource;
use crate::state::{IndexState, QueryState};
use crate::vectorstore::{VectorStore, validate_dimensions};

/// Outcome of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub document_id: String,
    /// Always [`IndexState::Indexed`] for a returned report.
    pub state: IndexState,
    pub chunk_count: usize,
    /// Embedding retries spent across all batches.
    pub retries: u32,
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. A pipeline is `Send + Sync`
/// and may serve concurrent indexing and query flows; the vector store is
/// the only state they share, apart from the per-document state table.
pub struct RagPipeline {
    config: RagConfig,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    retriever: Retriever,
    prompt_builder: PromptBuilder,
    generator: Arc<dyn Generator>,
    index_states: RwLock<HashMap<String, IndexState>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// The last recorded indexing state of `document_id`, if any.
    pub async fn index_state(&self, document_id: &str) -> Option<IndexState> {
        self.index_states.read().await.get(document_id).copied()
    }

    async fn set_state(&self, document_id: &str, state: IndexState) {
        debug!(document.id = document_id, %state, "index state");
        self.index_states.write().await.insert(document_id.to_string(), state);
    }

    async fn fail(&self, document_id: &str, stage: IndexState, source: RagError) -> RagError {
        error!(document.id = document_id, %stage, error = %source, "indexing failed");
        self.set_state(document_id, IndexState::Failed).await;
        RagError::IndexingFailed { document_id: document_id.to_string(), stage, source: Box::new(source) }
    }

    /// Index a single document: chunk → embed → store.
    ///
    /// Re-indexing a document supersedes its previous entries. On failure
    /// the store holds exactly the entries the document had before the
    /// call, and its state is [`IndexState::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexingFailed`] carrying the state in which the
    /// failure occurred and the originating error.
    #[instrument(skip_all, fields(document.id = %document.id))]
    pub async fn ingest(&self, document: &Document) -> Result<IndexReport> {
        let document_id = document.id.as_str();
        self.set_state(document_id, IndexState::Pending).await;

        let prior = match self.vector_store.document_entries(document_id).await {
            Ok(prior) => prior,
            Err(e) => return Err(self.fail(document_id, IndexState::Pending, e).await),
        };

        self.set_state(document_id, IndexState::Chunking).await;
        let chunks = self.chunker.chunk(document);

        self.set_state(document_id, IndexState::Embedding).await;
        let (embeddings, retries) = match self.embed_chunks(&chunks).await {
            Ok(embedded) => embedded,
            Err(e) => return Err(self.fail(document_id, IndexState::Embedding, e).await),
        };

        self.set_state(document_id, IndexState::Storing).await;
        let entries: Vec<IndexEntry> =
            chunks.into_iter().zip(embeddings).map(|(c, e)| IndexEntry::new(c, e)).collect();
        if let Err(e) = self.store_entries(&entries, &prior).await {
            return Err(self.fail(document_id, IndexState::Storing, e).await);
        }

        self.set_state(document_id, IndexState::Indexed).await;
        info!(document.id = document_id, chunk_count = entries.len(), retries, "indexed document");
        Ok(IndexReport {
            document_id: document_id.to_string(),
            state: IndexState::Indexed,
            chunk_count: entries.len(),
            retries,
        })
    }

    /// Embed chunk texts in batches, retrying each batch on transient failure.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<(Vec<Vec<f32>>, u32)> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let timeout = self.config.embed_timeout();
        let embedder = &self.embedder;
        let mut embeddings = Vec::with_capacity(texts.len());
        let mut retries = 0;

        for batch in texts.chunks(self.config.embed_batch_size) {
            let embedded = self
                .config
                .retry
                .run("embed_batch", move || {
                    with_timeout(timeout, embedder.embed_batch(batch), move || {
                        RagError::EmbeddingUnavailable {
                            provider: embedder.model_id().to_string(),
                            message: format!("embedding timed out after {} ms", timeout.as_millis()),
                        }
                    })
                })
                .await?;
            retries += embedded.retries;
            if embedded.value.len() != batch.len() {
                return Err(RagError::EmbeddingUnavailable {
                    provider: embedder.model_id().to_string(),
                    message: format!(
                        "returned {} embeddings for {} texts",
                        embedded.value.len(),
                        batch.len()
                    ),
                });
            }
            embeddings.extend(embedded.value);
        }
        Ok((embeddings, retries))
    }

    /// Write `entries`, then drop prior entries they do not replace.
    async fn store_entries(&self, entries: &[IndexEntry], prior: &[IndexEntry]) -> Result<()> {
        validate_dimensions(self.vector_store.dimensions(), entries)?;

        let fresh: HashSet<&str> = entries.iter().map(IndexEntry::chunk_id).collect();
        let stale: Vec<&str> =
            prior.iter().map(IndexEntry::chunk_id).filter(|id| !fresh.contains(id)).collect();

        let written = async {
            if !entries.is_empty() {
                self.vector_store.upsert_batch(entries).await?;
            }
            if !stale.is_empty() {
                self.vector_store.delete_entries(&stale).await?;
            }
            Ok::<(), RagError>(())
        }
        .await;

        if let Err(e) = written {
            self.roll_back(entries, prior).await;
            return Err(e);
        }
        Ok(())
    }

    /// Restore the entries a document had before a failed write.
    async fn roll_back(&self, attempted: &[IndexEntry], prior: &[IndexEntry]) {
        let attempted_ids: Vec<&str> = attempted.iter().map(IndexEntry::chunk_id).collect();
        if let Err(e) = self.vector_store.delete_entries(&attempted_ids).await {
            error!(error = %e, "rollback could not remove attempted entries");
        }
        if !prior.is_empty() {
            if let Err(e) = self.vector_store.upsert_batch(prior).await {
                error!(error = %e, "rollback could not restore prior entries");
                return;
            }
        }
        warn!(restored = prior.len(), "rolled back failed write");
    }

    /// Index documents concurrently, at most `index_concurrency` at a time.
    ///
    /// Returns one outcome per document, in input order. A failure affects
    /// only its own document.
    pub async fn ingest_batch(&self, documents: &[Document]) -> Vec<Result<IndexReport>> {
        stream::iter(documents)
            .map(|document| self.ingest(document))
            .buffered(self.config.index_concurrency)
            .collect()
            .await
    }

    /// Read documents from `source` and index them, as [`ingest_batch`](Self::ingest_batch).
    ///
    /// A document that cannot be read fails with
    /// [`RagError::IndexingFailed`] at [`IndexState::Pending`].
    pub async fn ingest_from_source(
        &self,
        source: &dyn DocumentSource,
        document_ids: &[String],
    ) -> Vec<Result<IndexReport>> {
        stream::iter(document_ids)
            .map(|document_id| async move {
                let text = match source.read(document_id).await {
                    Ok(text) => text,
                    Err(e) => return Err(self.fail(document_id, IndexState::Pending, e).await),
                };
                let mut document = Document::new(document_id.as_str(), text);
                document.source_uri = source.uri(document_id);
                self.ingest(&document).await
            })
            .buffered(self.config.index_concurrency)
            .collect()
            .await
    }

    /// Remove every entry of `document_id`. Returns the number removed.
    pub async fn remove_document(&self, document_id: &str) -> Result<usize> {
        let removed = self.vector_store.delete(document_id).await?;
        self.index_states.write().await.remove(document_id);
        info!(document.id = document_id, removed, "removed document");
        Ok(removed)
    }

    /// Retrieve chunks for `query` without generating an answer.
    ///
    /// Uses the query's `top_k` and `threshold`, falling back to the
    /// configured defaults.
    pub async fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        let k = query.top_k.unwrap_or(self.config.top_k);
        let threshold = query.threshold.unwrap_or(self.config.similarity_threshold);
        self.retriever.retrieve(&query.text, k, Some(threshold)).await
    }

    /// Answer `query`: retrieve → augment → generate.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::QueryFailed`] carrying the state in which the
    /// failure occurred and the originating error. No partial answer is
    /// produced.
    pub async fn query(&self, query: &Query) -> Result<Answer> {
        self.query_with_cancellation(query, &CancellationToken::new()).await
    }

    /// Like [`query`](Self::query), but stops with [`RagError::Cancelled`]
    /// once `cancel` fires.
    ///
    /// Cancellation is observed at every state transition and while waiting
    /// on retrieval or generation. A model call already in flight may still
    /// complete; its result is discarded.
    #[instrument(skip_all, fields(query.len = query.text.len()))]
    pub async fn query_with_cancellation(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        Self::checkpoint(cancel, QueryState::Received)?;

        let results = Self::stage(cancel, QueryState::Retrieving, self.retrieve(query)).await?;

        Self::checkpoint(cancel, QueryState::Augmenting)?;
        let prompt = self
            .prompt_builder
            .build(&query.text, &results, self.config.max_prompt_size)
            .map_err(|e| Self::query_failed(QueryState::Augmenting, e))?;

        let answer =
            Self::stage(cancel, QueryState::Generating, self.generator.generate(&prompt)).await?;

        info!(
            state = %QueryState::Answered,
            retrieved = results.len(),
            citations = answer.citations.len(),
            dropped = prompt.dropped,
            "answered query"
        );
        Ok(answer)
    }

    fn checkpoint(cancel: &CancellationToken, stage: QueryState) -> Result<()> {
        if cancel.is_cancelled() {
            warn!(%stage, "query cancelled");
            return Err(RagError::Cancelled { stage });
        }
        debug!(%stage, "query state");
        Ok(())
    }

    async fn stage<T>(
        cancel: &CancellationToken,
        stage: QueryState,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        Self::checkpoint(cancel, stage)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(%stage, "query cancelled");
                Err(RagError::Cancelled { stage })
            }
            result = work => result.map_err(|e| Self::query_failed(stage, e)),
        }
    }

    fn query_failed(stage: QueryState, source: RagError) -> RagError {
        error!(%stage, error = %source, "query failed");
        RagError::QueryFailed { stage, source: Box::new(source) }
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedder`, `vector_store`, and a generator (either
/// [`generator`](Self::generator) or [`language_model`](Self::language_model))
/// are required. Without a chunker, a [`RecursiveChunker`] sized from the
/// config is used.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedder(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .chunker(Arc::new(chunker))  // optional
///     .language_model(Arc::new(model))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedder: Option<Arc<dyn Embedder>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    generator: Option<Arc<dyn Generator>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    prompt_builder: Option<PromptBuilder>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedder.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the generator. Takes precedence over [`language_model`](Self::language_model).
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Generate with a [`GroundedGenerator`] over `model`, configured from the pipeline config.
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    pub fn prompt_builder(mut self, builder: PromptBuilder) -> Self {
        self.prompt_builder = Some(builder);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are
    /// set and the components agree with each other.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if a required field is missing,
    /// the config is invalid, or the embedder and store disagree on
    /// dimensionality or the store's metric differs from the config's.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::InvalidConfig("config is required".to_string()))?;
        config.validate()?;
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::InvalidConfig("embedder is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::InvalidConfig("vector_store is required".to_string()))?;

        if embedder.dimensions() != vector_store.dimensions() {
            return Err(RagError::InvalidConfig(format!(
                "embedder '{}' produces {} dimensions but the vector store holds {}",
                embedder.model_id(),
                embedder.dimensions(),
                vector_store.dimensions()
            )));
        }
        if vector_store.metric() != config.metric {
            return Err(RagError::InvalidConfig(format!(
                "vector store uses {} similarity but the config selects {}",
                vector_store.metric(),
                config.metric
            )));
        }

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let generator = match (self.generator, self.language_model) {
            (Some(generator), _) => generator,
            (None, Some(model)) => Arc::new(GroundedGenerator::from_config(model, &config)),
            (None, None) => {
                return Err(RagError::InvalidConfig(
                    "generator or language_model is required".to_string(),
                ));
            }
        };
        let retriever = Retriever::new(embedder.clone(), vector_store.clone(), config.embed_timeout());

        Ok(RagPipeline {
            config,
            embedder,
            vector_store,
            chunker,
            retriever,
            prompt_builder: self.prompt_builder.unwrap_or_default(),
            generator,
            index_states: RwLock::new(HashMap::new()),
        })
    }
}
