//! # docqa-rag
//!
//! Retrieval-augmented question answering over a private document corpus.
//!
//! ## Overview
//!
//! Documents are split into overlapping chunks, embedded, and stored in a
//! vector index. A question is embedded the same way, the most similar
//! chunks are retrieved and packed into a bounded prompt, and a language
//! model answers from that context. Every [`Answer`] cites exactly the
//! chunks it was given.
//!
//! - [`Chunker`] - [`RecursiveChunker`], [`FixedSizeChunker`]
//! - [`Embedder`] - [`HashEmbedder`], plus Ollama and OpenAI backends
//! - [`VectorStore`] - [`InMemoryVectorStore`], [`FileVectorStore`], Qdrant
//! - [`Retriever`], [`PromptBuilder`], [`Generator`]
//! - [`RagPipeline`] - the indexing and query flows
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{Document, HashEmbedder, InMemoryVectorStore, Query, RagConfig, RagPipeline, SimilarityMetric};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedder(Arc::new(HashEmbedder::new(256)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new(256, SimilarityMetric::Cosine)))
//!     .language_model(model)
//!     .build()?;
//!
//! pipeline.ingest(&Document::new("q1.txt", "Revenue grew 25% in North America.")).await?;
//! let answer = pipeline.query(&Query::new("How did North America perform?")).await?;
//! for citation in &answer.citations {
//!     println!("{} ({:.2})", citation.chunk_id, citation.score);
//! }
//! ```
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `ollama` | [`OllamaEmbedder`](ollama::OllamaEmbedder), [`OllamaModel`](ollama::OllamaModel) |
//! | `openai` | [`OpenAIEmbedder`](openai::OpenAIEmbedder), [`OpenAIChatModel`](openai::OpenAIChatModel) |
//! | `qdrant` | [`QdrantVectorStore`](qdrant::QdrantVectorStore) |

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod file;
pub mod generator;
pub mod inmemory;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod prompt;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod retriever;
pub mod retry;
pub mod similarity;
pub mod source;
pub mod state;
pub mod vectorstore;

pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, chunk_document};
pub use config::{NoContextPolicy, RagConfig, RagConfigBuilder};
pub use document::{
    Answer, Chunk, Citation, Document, IndexEntry, Query, RetrievalResult, SearchResult, Table,
};
pub use embedding::{Embedder, HashEmbedder};
pub use error::{ErrorKind, RagError, Result};
pub use file::FileVectorStore;
pub use generator::{Generator, GroundedGenerator, LanguageModel, NO_CONTEXT_NOTICE};
pub use inmemory::InMemoryVectorStore;
#[cfg(feature = "ollama")]
pub use ollama::{OllamaEmbedder, OllamaModel};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIEmbedder};
pub use pipeline::{IndexReport, RagPipeline, RagPipelineBuilder};
pub use prompt::{AugmentedPrompt, PromptBuilder};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
pub use retriever::Retriever;
pub use retry::{Retried, RetryPolicy};
pub use similarity::{SimilarityMetric, rank, rank_order};
pub use source::{DocumentSource, FsDocumentSource};
pub use state::{IndexState, QueryState};
pub use vectorstore::VectorStore;

pub use tokio_util::sync::CancellationToken;
