//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`]: windows of a fixed character count with overlap
//! - [`RecursiveChunker`]: the same window, cut back to the coarsest
//!   separator (paragraph, line, sentence, word) that keeps progress
//!
//! Both count sizes in characters, never split a UTF-8 character, and
//! produce the same boundaries for the same input and configuration.
//! Consecutive chunks share exactly `overlap` characters, so de-overlapping
//! them by offset reconstructs the document.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into ordered chunks covering the whole text.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Split `document` into fixed-size chunks.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfig`] if `max_size` is zero or
/// `overlap >= max_size`.
pub fn chunk_document(document: &Document, max_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(FixedSizeChunker::new(max_size, overlap)?.chunk(document))
}

fn validate(max_size: usize, overlap: usize) -> Result<()> {
    if max_size == 0 {
        return Err(RagError::InvalidConfig("chunk size must be greater than zero".to_string()));
    }
    if overlap >= max_size {
        return Err(RagError::InvalidConfig(format!(
            "chunk_overlap ({overlap}) must be less than chunk_size ({max_size})"
        )));
    }
    Ok(())
}

/// Byte offset of every character start, plus the text length.
fn char_boundaries(text: &str) -> Vec<usize> {
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    boundaries
}

fn make_chunk(document: &Document, start: usize, end: usize, sequence_index: usize) -> Chunk {
    let mut metadata = document.metadata.clone();
    metadata.insert("chunk_index".to_string(), sequence_index.to_string());
    if let Some(uri) = &document.source_uri {
        metadata.insert("source_uri".to_string(), uri.clone());
    }
    Chunk {
        id: Chunk::make_id(&document.id, sequence_index),
        document_id: document.id.clone(),
        text: document.text[start..end].to_string(),
        offset_start: start,
        offset_end: end,
        sequence_index,
        metadata,
    }
}

/// Walk the document window by window. `cut` receives the character range
/// `[start, hard_end)` of a window that does not reach the end of the text
/// and returns the character index to cut at, which must be greater than
/// `start + overlap`.
fn split_windows<F>(document: &Document, max_size: usize, overlap: usize, cut: F) -> Vec<Chunk>
where
    F: Fn(&[usize], usize, usize) -> usize,
{
    let boundaries = char_boundaries(&document.text);
    let char_count = boundaries.len() - 1;
    let mut chunks = Vec::new();
    if char_count == 0 {
        return chunks;
    }

    let mut start = 0;
    loop {
        let hard_end = (start + max_size).min(char_count);
        let end = if hard_end == char_count { hard_end } else { cut(&boundaries, start, hard_end) };
        chunks.push(make_chunk(document, boundaries[start], boundaries[end], chunks.len()));
        if end == char_count {
            break;
        }
        start = end - overlap;
    }
    chunks
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus a `chunk_index` field.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        split_windows(document, self.chunk_size, self.chunk_overlap, |_, _, hard_end| hard_end)
    }
}

/// Separators tried from coarsest to finest.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Splits text at natural boundaries: paragraphs → lines → sentences → words.
///
/// Each window holds at most `chunk_size` characters. When a window does not
/// reach the end of the document, it is cut just after the last occurrence
/// of the coarsest separator that lies beyond the overlap region; if no
/// separator qualifies the window is cut at `chunk_size`. The next window
/// starts `chunk_overlap` characters before the cut.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

/// Find the character index just after the last coarsest separator in
/// `text[boundaries[start + overlap]..boundaries[hard_end]]`.
fn separator_cut(
    text: &str,
    boundaries: &[usize],
    start: usize,
    hard_end: usize,
    overlap: usize,
) -> usize {
    let region_start = boundaries[start + overlap];
    let region = &text[region_start..boundaries[hard_end]];
    for separator in SEPARATORS {
        if let Some(pos) = region.rfind(separator) {
            let cut_byte = region_start + pos + separator.len();
            // Separators are ASCII, so the cut is always a character boundary.
            if let Ok(cut) = boundaries.binary_search(&cut_byte) {
                return cut;
            }
        }
    }
    hard_end
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let overlap = self.chunk_overlap;
        split_windows(document, self.chunk_size, overlap, |boundaries, start, hard_end| {
            separator_cut(&document.text, boundaries, start, hard_end, overlap)
        })
    }
}
