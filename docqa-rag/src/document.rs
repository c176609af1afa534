//! Data types for documents, chunks, index entries, queries, and answers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A source document containing text content and metadata.
///
/// Documents are immutable once ingested. Re-ingesting a document with the
/// same `id` supersedes the previously indexed version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier for the document, typically a relative file path.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata copied onto every chunk of the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Structured tables extracted from the document. Not embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Table>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with no metadata, tables, or source URI.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: HashMap::new(),
            tables: Vec::new(),
            source_uri: None,
        }
    }

    /// Add a metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a structured table.
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Set the source URI.
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }
}

/// A structured table carried alongside a [`Document`].
///
/// Tables are not part of retrieval; they are passed through for
/// presentation layers that derive charts from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Values of the named column, in row order. `None` if the column is unknown.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row.get(idx).map(String::as_str).unwrap_or("")).collect())
    }
}

/// A contiguous segment of exactly one [`Document`].
///
/// Offsets are byte offsets into the document text and always fall on
/// character boundaries, with `offset_start < offset_end`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk: `{document_id}_{sequence_index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Byte offset of the first character of the chunk in the document.
    pub offset_start: usize,
    /// Byte offset one past the last character of the chunk.
    pub offset_end: usize,
    /// Position of the chunk within its document, starting at zero.
    pub sequence_index: usize,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Build the canonical chunk ID for a document position.
    pub fn make_id(document_id: &str, sequence_index: usize) -> String {
        format!("{document_id}_{sequence_index}")
    }
}

/// A chunk with its embedding, as stored in a
/// [`VectorStore`](crate::vectorstore::VectorStore).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self { chunk, embedding }
    }

    /// The key under which the entry is stored.
    pub fn chunk_id(&self) -> &str {
        &self.chunk.id
    }

    pub fn document_id(&self) -> &str {
        &self.chunk.document_id
    }
}

/// A retrieved [`Chunk`] paired with a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Search results ordered by descending similarity. May be empty.
pub type RetrievalResult = Vec<SearchResult>;

/// A natural-language question with optional retrieval overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub text: String,
    /// Number of chunks to retrieve. The pipeline default applies when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Minimum similarity. The pipeline default applies when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), top_k: None, threshold: None }
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// A chunk that was provided to the language model as context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    /// Similarity of the chunk to the query at retrieval time.
    pub score: f32,
}

/// A generated answer with its provenance.
///
/// `citations` lists exactly the chunks included in the prompt, in prompt
/// order. It is never derived from the model's output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl Answer {
    /// Whether the answer was generated with retrieved context.
    pub fn is_grounded(&self) -> bool {
        !self.citations.is_empty()
    }

    /// Cited document IDs, deduplicated, in first-citation order.
    pub fn cited_documents(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for citation in &self.citations {
            if !seen.contains(&citation.document_id.as_str()) {
                seen.push(citation.document_id.as_str());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_column_lookup() {
        let table = Table {
            name: "q1_revenue".into(),
            columns: vec!["Region".into(), "Revenue".into()],
            rows: vec![
                vec!["North America".into(), "1.5".into()],
                vec!["Europe".into(), "0.7".into()],
            ],
        };
        assert_eq!(table.column("Revenue"), Some(vec!["1.5", "0.7"]));
        assert_eq!(table.column("Missing"), None);
    }

    #[test]
    fn cited_documents_are_deduplicated_in_order() {
        let cite = |chunk: &str, doc: &str| Citation {
            chunk_id: chunk.into(),
            document_id: doc.into(),
            score: 0.5,
        };
        let answer = Answer {
            text: "answer".into(),
            citations: vec![cite("b_0", "b"), cite("a_1", "a"), cite("b_2", "b")],
        };
        assert_eq!(answer.cited_documents(), vec!["b", "a"]);
        assert!(answer.is_grounded());
    }
}
