//! Error types for the `docqa-rag` crate.

use thiserror::Error;

use crate::state::{IndexState, QueryState};

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad chunking, threshold, or pipeline parameters. Fatal at setup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The embedding model service could not produce embeddings.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model did not answer within the per-call timeout.
    #[error("Generation timed out ({model}) after {timeout_ms} ms")]
    GenerationTimeout {
        /// The language model that timed out.
        model: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The language model service was unreachable or returned malformed output.
    #[error("Generation service error ({model}): {message}")]
    GenerationServiceError {
        /// The language model that produced the error.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// An embedding does not match the store's fixed dimension, or the
    /// persisted index was built by a different embedding model.
    #[error("Index corruption: {0}")]
    IndexCorruption(String),

    /// The question is too long to fit the prompt budget even without
    /// retrieved context. Specific to one query; the pipeline stays usable.
    #[error("Prompt too large: {required} chars needed without context, limit is {max_prompt_size}")]
    PromptTooLarge {
        /// Size of the prompt with no context blocks.
        required: usize,
        /// The configured `max_prompt_size`.
        max_prompt_size: usize,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The document source collaborator could not supply a document.
    #[error("Document source error ({document_id}): {message}")]
    DocumentSource {
        /// The requested document.
        document_id: String,
        /// A description of the failure.
        message: String,
    },

    /// A document could not be indexed. The store holds its prior entries.
    #[error("Indexing of document '{document_id}' failed while {stage}: {source}")]
    IndexingFailed {
        /// The document that failed.
        document_id: String,
        /// The indexing state in which the failure occurred.
        stage: IndexState,
        /// The originating error.
        source: Box<RagError>,
    },

    /// A query flow failed. No partial answer is produced.
    #[error("Query failed while {stage}: {source}")]
    QueryFailed {
        /// The query state in which the failure occurred.
        stage: QueryState,
        /// The originating error.
        source: Box<RagError>,
    },

    /// A query flow was cancelled by its caller.
    #[error("Query cancelled while {stage}")]
    Cancelled {
        /// The query state at which cancellation was observed.
        stage: QueryState,
    },
}

/// A flat classification of [`RagError`] for callers that need to pick a
/// specific failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfig,
    EmbeddingUnavailable,
    GenerationTimeout,
    GenerationServiceError,
    IndexCorruption,
    PromptTooLarge,
    VectorStore,
    DocumentSource,
    Cancelled,
}

impl RagError {
    /// Build an [`RagError::IndexCorruption`] for a dimension mismatch.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        RagError::IndexCorruption(format!(
            "expected {expected}-dimensional embedding, got {actual}"
        ))
    }

    /// The kind of the originating error.
    ///
    /// Wrapper variants ([`IndexingFailed`](RagError::IndexingFailed),
    /// [`QueryFailed`](RagError::QueryFailed)) report the kind of the error
    /// they wrap.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            RagError::EmbeddingUnavailable { .. } => ErrorKind::EmbeddingUnavailable,
            RagError::GenerationTimeout { .. } => ErrorKind::GenerationTimeout,
            RagError::GenerationServiceError { .. } => ErrorKind::GenerationServiceError,
            RagError::IndexCorruption(_) => ErrorKind::IndexCorruption,
            RagError::PromptTooLarge { .. } => ErrorKind::PromptTooLarge,
            RagError::VectorStore { .. } => ErrorKind::VectorStore,
            RagError::DocumentSource { .. } => ErrorKind::DocumentSource,
            RagError::Cancelled { .. } => ErrorKind::Cancelled,
            RagError::IndexingFailed { source, .. } | RagError::QueryFailed { source, .. } => {
                source.kind()
            }
        }
    }

    /// Whether retrying the failed call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EmbeddingUnavailable
                | ErrorKind::GenerationTimeout
                | ErrorKind::GenerationServiceError
        )
    }

    /// The query state at which a query flow failed, if this is a query error.
    pub fn query_stage(&self) -> Option<QueryState> {
        match self {
            RagError::QueryFailed { stage, .. } | RagError::Cancelled { stage } => Some(*stage),
            _ => None,
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
