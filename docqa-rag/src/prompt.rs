//! Prompt augmentation under a size budget.
//!
//! [`PromptBuilder`] renders retrieved chunks and the user question into one
//! prompt. Sizes are counted in characters over the whole rendered prompt:
//! instructions, context blocks, and question together never exceed
//! `max_prompt_size`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Citation, SearchResult};
use crate::error::{RagError, Result};

const GROUNDED_INSTRUCTIONS: &str = concat!(
    "You are a helpful assistant that answers questions using only the provided context. ",
    "If the answer cannot be found in the context, say that it is not in the provided documents. ",
    "Refer to sources by their identifier.\n\n",
);

const NO_CONTEXT_INSTRUCTIONS: &str = concat!(
    "No external context was found for this question in the indexed documents. ",
    "Answer from general knowledge and say clearly that the answer is not supported ",
    "by the documents.\n\n",
);

const CONTEXT_HEADER: &str = "Context:\n";

/// A rendered prompt and the chunks it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedPrompt {
    /// The original question.
    pub query: String,
    /// The full prompt text sent to the language model.
    pub text: String,
    /// The chunks included as context, in prompt order.
    pub citations: Vec<Citation>,
    /// Retrieved chunks left out because the budget was exhausted.
    pub dropped: usize,
}

impl AugmentedPrompt {
    /// Whether any retrieved chunk made it into the prompt.
    pub fn has_context(&self) -> bool {
        !self.citations.is_empty()
    }
}

/// Renders [`AugmentedPrompt`]s.
///
/// Chunks are taken in retrieval order (highest similarity first) and each
/// is headed `[source: <chunk_id> (document <document_id>)]`. Packing is
/// greedy: the first chunk that does not fit ends the context, and no chunk
/// is ever truncated. When nothing fits, or nothing was retrieved, the
/// no-context variant is rendered instead.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    grounded_instructions: String,
    no_context_instructions: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            grounded_instructions: GROUNDED_INSTRUCTIONS.to_string(),
            no_context_instructions: NO_CONTEXT_INSTRUCTIONS.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the instruction text that precedes retrieved context.
    pub fn with_grounded_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.grounded_instructions = instructions.into();
        self
    }

    /// Replace the instruction text used when no context is available.
    pub fn with_no_context_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.no_context_instructions = instructions.into();
        self
    }

    /// Build a prompt for `query` from `results`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PromptTooLarge`] if the instructions and question
    /// alone exceed `max_prompt_size`.
    pub fn build(
        &self,
        query: &str,
        results: &[SearchResult],
        max_prompt_size: usize,
    ) -> Result<AugmentedPrompt> {
        let question = render_question(query);
        let no_context_size = char_len(&self.no_context_instructions) + char_len(&question);
        if no_context_size > max_prompt_size {
            return Err(RagError::PromptTooLarge { required: no_context_size, max_prompt_size });
        }

        let mut used = char_len(&self.grounded_instructions)
            + char_len(CONTEXT_HEADER)
            + char_len(&question);
        let mut blocks = String::new();
        let mut citations = Vec::new();
        for result in results {
            let block = render_block(result);
            let size = char_len(&block);
            if used + size > max_prompt_size {
                break;
            }
            used += size;
            blocks.push_str(&block);
            citations.push(Citation {
                chunk_id: result.chunk.id.clone(),
                document_id: result.chunk.document_id.clone(),
                score: result.score,
            });
        }
        let dropped = results.len() - citations.len();

        let text = if citations.is_empty() {
            format!("{}{question}", self.no_context_instructions)
        } else {
            format!("{}{CONTEXT_HEADER}{blocks}{question}", self.grounded_instructions)
        };
        debug!(included = citations.len(), dropped, prompt_chars = char_len(&text), "built prompt");

        Ok(AugmentedPrompt { query: query.to_string(), text, citations, dropped })
    }
}

fn render_block(result: &SearchResult) -> String {
    format!(
        "[source: {} (document {})]\n{}\n\n",
        result.chunk.id, result.chunk.document_id, result.chunk.text
    )
}

fn render_question(query: &str) -> String {
    format!("Question: {query}\n\nAnswer:")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::Chunk;

    fn result(doc: &str, seq: usize, text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: Chunk::make_id(doc, seq),
                document_id: doc.into(),
                text: text.into(),
                offset_start: 0,
                offset_end: text.len(),
                sequence_index: seq,
                metadata: HashMap::new(),
            },
            score,
        }
    }

    fn five_equal_chunks() -> Vec<SearchResult> {
        (0..5)
            .map(|i| result("report", i, "equal length quarterly figures", 0.9 - i as f32 * 0.1))
            .collect()
    }

    #[test]
    fn context_is_tagged_with_source_identifiers() {
        let results = vec![result("q1", 0, "Revenue grew 25%.", 0.8)];
        let prompt = PromptBuilder::new().build("How did revenue change?", &results, 6000).unwrap();
        assert!(prompt.text.contains("[source: q1_0 (document q1)]\nRevenue grew 25%."));
        assert!(prompt.text.ends_with("Question: How did revenue change?\n\nAnswer:"));
        assert_eq!(prompt.citations.len(), 1);
        assert_eq!(prompt.dropped, 0);
    }

    #[test]
    fn budget_admits_only_the_top_chunks() {
        let results = five_equal_chunks();
        let builder = PromptBuilder::new();
        let budget = builder.build("q?", &results[..2], usize::MAX).unwrap().text.chars().count();

        let prompt = builder.build("q?", &results, budget).unwrap();
        let ids: Vec<&str> = prompt.citations.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["report_0", "report_1"]);
        assert_eq!(prompt.dropped, 3);
        assert!(prompt.text.chars().count() <= budget);
        assert!(!prompt.text.contains("report_2"));
    }

    #[test]
    fn packing_stops_at_first_chunk_that_does_not_fit() {
        let mut results = five_equal_chunks();
        results[1] = result("report", 1, &"x".repeat(500), 0.8);
        let builder = PromptBuilder::new();
        let budget = builder.build("q?", &results[..1], usize::MAX).unwrap().text.chars().count() + 100;

        let prompt = builder.build("q?", &results, budget).unwrap();
        assert_eq!(prompt.citations.len(), 1);
        assert_eq!(prompt.dropped, 4);
    }

    #[test]
    fn empty_retrieval_renders_no_context_variant() {
        let prompt = PromptBuilder::new().build("Who won?", &[], 6000).unwrap();
        assert!(!prompt.has_context());
        assert!(prompt.text.starts_with("No external context was found"));
        assert!(prompt.text.contains("Question: Who won?"));
    }

    #[test]
    fn oversized_chunks_fall_back_to_no_context() {
        let results = vec![result("big", 0, &"y".repeat(10_000), 0.9)];
        let prompt = PromptBuilder::new().build("q?", &results, 1000).unwrap();
        assert!(!prompt.has_context());
        assert_eq!(prompt.dropped, 1);
        assert!(prompt.text.chars().count() <= 1000);
    }

    #[test]
    fn custom_instructions_replace_the_defaults() {
        let builder = PromptBuilder::new()
            .with_grounded_instructions("Answer tersely.\n")
            .with_no_context_instructions("Nothing retrieved.\n");
        let results = vec![result("q1", 0, "Revenue grew 25%.", 0.8)];
        assert!(builder.build("q?", &results, 6000).unwrap().text.starts_with("Answer tersely.\nContext:\n"));
        assert!(builder.build("q?", &[], 6000).unwrap().text.starts_with("Nothing retrieved.\n"));
    }

    #[test]
    fn overlong_question_is_prompt_too_large() {
        let err = PromptBuilder::new().build("q?", &[], 10).unwrap_err();
        assert!(matches!(err, RagError::PromptTooLarge { max_prompt_size: 10, .. }));

        let question = "why ".repeat(2000);
        let err = PromptBuilder::new().build(&question, &[], 6000).unwrap_err();
        assert!(matches!(err, RagError::PromptTooLarge { required, .. } if required > 6000));
        assert!(!err.is_retryable());
    }

    #[test]
    fn sizes_count_characters_not_bytes() {
        let results = vec![result("jp", 0, "売上は増加した", 0.9)];
        let builder = PromptBuilder::new();
        let exact = builder.build("質問", &results, usize::MAX).unwrap().text.chars().count();
        assert!(builder.build("質問", &results, exact).unwrap().has_context());
    }
}
