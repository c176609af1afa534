//! File-backed vector store.
//!
//! [`FileVectorStore`] keeps the index in memory and rewrites a JSON file
//! on every mutation. The file is written to a sibling temporary path and
//! renamed into place, so a crash never leaves a half-written index. A
//! mutation reaches the in-memory index only once the file holds it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::document::{IndexEntry, RetrievalResult};
use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorStore;
use crate::similarity::SimilarityMetric;
use crate::vectorstore::{VectorStore, validate_dimensions};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    model_id: String,
    dimensions: usize,
    metric: SimilarityMetric,
    entries: Vec<IndexEntry>,
}

/// A [`VectorStore`] persisted to a single JSON file.
///
/// The file records the embedding model ID, dimensionality, and metric it
/// was built with. Opening it with a different model or dimensionality
/// fails with [`RagError::IndexCorruption`]: the stored vectors are
/// unusable and the index has to be rebuilt.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{FileVectorStore, SimilarityMetric};
///
/// let store = FileVectorStore::open("index.json", "hash-256", 256, SimilarityMetric::Cosine).await?;
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    path: PathBuf,
    model_id: String,
    inner: InMemoryVectorStore,
    write_lock: Mutex<()>,
}

impl FileVectorStore {
    /// Open the index at `path`, creating an empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexCorruption`] if the file was built with another
    ///   embedding model or dimensionality, or cannot be parsed.
    /// - [`RagError::InvalidConfig`] if the file uses another metric.
    /// - [`RagError::VectorStore`] on I/O failure.
    pub async fn open(
        path: impl AsRef<Path>,
        model_id: impl Into<String>,
        dimensions: usize,
        metric: SimilarityMetric,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let model_id = model_id.into();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: IndexFile = serde_json::from_slice(&bytes).map_err(|e| {
                    RagError::IndexCorruption(format!("cannot parse {}: {e}", path.display()))
                })?;
                Self::check_header(&file, &model_id, dimensions, metric)?;
                info!(path = %path.display(), entry_count = file.entries.len(), "loaded index file");
                file.entries.into_iter().map(|e| (e.chunk.id.clone(), e)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "index file not found, starting empty");
                HashMap::new()
            }
            Err(e) => return Err(Self::io_err(&path, e)),
        };

        Ok(Self {
            path,
            model_id,
            inner: InMemoryVectorStore::with_entries(dimensions, metric, entries),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_header(
        file: &IndexFile,
        model_id: &str,
        dimensions: usize,
        metric: SimilarityMetric,
    ) -> Result<()> {
        if file.version != FORMAT_VERSION {
            return Err(RagError::IndexCorruption(format!(
                "unsupported index format version {}",
                file.version
            )));
        }
        if file.model_id != model_id || file.dimensions != dimensions {
            return Err(RagError::IndexCorruption(format!(
                "index was built with model '{}' ({} dims), current model is '{model_id}' ({dimensions} dims); rebuild the index",
                file.model_id, file.dimensions
            )));
        }
        if file.metric != metric {
            return Err(RagError::InvalidConfig(format!(
                "index uses {} similarity, configured metric is {metric}",
                file.metric
            )));
        }
        Ok(())
    }

    fn io_err(path: &Path, e: std::io::Error) -> RagError {
        RagError::VectorStore { backend: "file".to_string(), message: format!("{}: {e}", path.display()) }
    }

    /// Write `entries` as the complete index. The in-memory index is only
    /// updated by callers after this succeeds.
    async fn persist(&self, mut entries: Vec<IndexEntry>) -> Result<()> {
        entries.sort_by(|a, b| a.chunk.id.cmp(&b.chunk.id));
        let file = IndexFile {
            version: FORMAT_VERSION,
            model_id: self.model_id.clone(),
            dimensions: self.inner.dimensions(),
            metric: self.inner.metric(),
            entries,
        };
        let bytes = serde_json::to_vec(&file).map_err(|e| RagError::VectorStore {
            backend: "file".to_string(),
            message: format!("serialize index: {e}"),
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| Self::io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| Self::io_err(&self.path, e))?;
        debug!(path = %self.path.display(), entry_count = file.entries.len(), "persisted index file");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn metric(&self) -> SimilarityMetric {
        self.inner.metric()
    }

    async fn upsert_batch(&self, entries: &[IndexEntry]) -> Result<()> {
        validate_dimensions(self.inner.dimensions(), entries)?;
        let _guard = self.write_lock.lock().await;
        let mut next: HashMap<String, IndexEntry> =
            self.inner.snapshot().await.into_iter().map(|e| (e.chunk.id.clone(), e)).collect();
        for entry in entries {
            next.insert(entry.chunk.id.clone(), entry.clone());
        }
        self.persist(next.into_values().collect()).await?;
        self.inner.upsert_batch(entries).await
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        threshold: Option<f32>,
    ) -> Result<RetrievalResult> {
        self.inner.search(embedding, top_k, threshold).await
    }

    async fn delete(&self, document_id: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let (kept, removed): (Vec<IndexEntry>, Vec<IndexEntry>) = self
            .inner
            .snapshot()
            .await
            .into_iter()
            .partition(|e| e.chunk.document_id != document_id);
        if removed.is_empty() {
            return Ok(0);
        }
        self.persist(kept).await?;
        self.inner.delete(document_id).await
    }

    async fn delete_entries(&self, chunk_ids: &[&str]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let doomed: HashSet<&str> = chunk_ids.iter().copied().collect();
        let (removed, kept): (Vec<IndexEntry>, Vec<IndexEntry>) = self
            .inner
            .snapshot()
            .await
            .into_iter()
            .partition(|e| doomed.contains(e.chunk_id()));
        if removed.is_empty() {
            return Ok(0);
        }
        self.persist(kept).await?;
        self.inner.delete_entries(chunk_ids).await
    }

    async fn document_entries(&self, document_id: &str) -> Result<Vec<IndexEntry>> {
        self.inner.document_entries(document_id).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }
}
