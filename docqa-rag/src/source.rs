//! Document sources.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RagError, Result};

/// Supplies raw document text by identifier.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Read the full text of `document_id`.
    async fn read(&self, document_id: &str) -> Result<String>;

    /// A URI describing where `document_id` came from, if the source has one.
    fn uri(&self, _document_id: &str) -> Option<String> {
        None
    }
}

/// Reads documents below a root directory.
///
/// `.txt` and `.md` files are read as UTF-8. With the `pdf` feature, `.pdf`
/// files are listed too and their text is extracted with `pdf-extract`.
///
/// Document IDs are paths relative to the root, always with `/` separators.
/// IDs that are absolute or contain `..` are rejected so a caller cannot
/// read outside the root.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
}

#[cfg(feature = "pdf")]
const INDEXABLE_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];
#[cfg(not(feature = "pdf"))]
const INDEXABLE_EXTENSIONS: &[&str] = &["txt", "md"];

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, document_id: &str) -> Result<PathBuf> {
        let relative = Path::new(document_id);
        let escapes = document_id.is_empty()
            || relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(RagError::DocumentSource {
                document_id: document_id.to_string(),
                message: format!("not a path inside {}", self.root.display()),
            });
        }
        Ok(self.root.join(relative))
    }

    /// IDs of all indexable files below the root, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentSource`] if a directory cannot be read.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| self.io_err(&dir, e))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| self.io_err(&dir, e))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| self.io_err(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() && is_indexable(&path) {
                    if let Some(id) = self.document_id(&path) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort();
        debug!(root = %self.root.display(), document_count = ids.len(), "listed documents");
        Ok(ids)
    }

    fn document_id(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative.components().map(|c| c.as_os_str().to_str()).collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    fn io_err(&self, path: &Path, e: std::io::Error) -> RagError {
        let document_id = self.document_id(path).unwrap_or_else(|| path.display().to_string());
        RagError::DocumentSource { document_id, message: e.to_string() }
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

fn is_indexable(path: &Path) -> bool {
    INDEXABLE_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}

fn source_err(document_id: &str, message: impl Into<String>) -> RagError {
    RagError::DocumentSource { document_id: document_id.to_string(), message: message.into() }
}

/// Extract the text of a PDF. Parsing is CPU-bound, so it runs on the
/// blocking pool.
#[cfg(feature = "pdf")]
async fn read_pdf(document_id: &str, path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| source_err(document_id, e.to_string()))?;
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| source_err(document_id, format!("PDF extraction aborted: {e}")))?;
    let text = extracted
        .map_err(|e| source_err(document_id, format!("failed to extract text from PDF: {e}")))?;
    debug!(document.id = document_id, chars = text.chars().count(), "extracted PDF text");
    Ok(text)
}

#[cfg(not(feature = "pdf"))]
async fn read_pdf(document_id: &str, _path: &Path) -> Result<String> {
    Err(source_err(document_id, "PDF support not enabled; build with the `pdf` feature"))
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn read(&self, document_id: &str) -> Result<String> {
        let path = self.resolve(document_id)?;
        if has_extension(&path, "pdf") {
            return read_pdf(document_id, &path).await;
        }
        tokio::fs::read_to_string(&path).await.map_err(|e| source_err(document_id, e.to_string()))
    }

    fn uri(&self, document_id: &str) -> Option<String> {
        self.resolve(document_id).ok().map(|path| path.display().to_string())
    }
}
