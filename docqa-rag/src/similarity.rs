//! Similarity metrics and the deterministic ranking order for search results.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::SearchResult;

/// The similarity metric of a vector store. Fixed per store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine similarity in `[-1.0, 1.0]`.
    #[default]
    Cosine,
    /// Raw dot product. Equivalent to cosine for L2-normalized vectors.
    InnerProduct,
}

impl SimilarityMetric {
    /// Score two vectors of equal length. Higher is more similar.
    ///
    /// Cosine returns 0.0 if either vector has zero magnitude.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        match self {
            SimilarityMetric::InnerProduct => dot,
            SimilarityMetric::Cosine => {
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 0.0;
                }
                // Rounding can push a self-match past 1.0.
                (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
            }
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => f.write_str("cosine"),
            SimilarityMetric::InnerProduct => f.write_str("inner_product"),
        }
    }
}

/// Ranking order: descending score, then ascending chunk sequence index,
/// then ascending document ID.
pub fn rank_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
}

/// Sort, filter by `threshold`, and truncate to `top_k`.
///
/// NaN scores, which overflow on huge vectors can produce, are dropped.
pub fn rank(mut results: Vec<SearchResult>, top_k: usize, threshold: Option<f32>) -> Vec<SearchResult> {
    results.retain(|r| !r.score.is_nan());
    if let Some(threshold) = threshold {
        results.retain(|r| r.score >= threshold);
    }
    results.sort_by(rank_order);
    results.truncate(top_k);
    results
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::Chunk;

    fn result(doc: &str, seq: usize, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: Chunk::make_id(doc, seq),
                document_id: doc.into(),
                text: String::new(),
                offset_start: 0,
                offset_end: 1,
                sequence_index: seq,
                metadata: HashMap::new(),
            },
            score,
        }
    }

    #[test]
    fn cosine_of_vector_with_itself_is_one() {
        let v = [0.3, -0.2, 0.9];
        assert!((SimilarityMetric::Cosine.score(&v, &v) - 1.0).abs() < 1e-6);
        assert_eq!(SimilarityMetric::Cosine.score(&v, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn inner_product_is_dot() {
        assert_eq!(SimilarityMetric::InnerProduct.score(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }

    #[test]
    fn ties_break_by_sequence_then_document() {
        let ranked = rank(
            vec![result("b", 1, 0.5), result("b", 0, 0.5), result("a", 1, 0.5), result("c", 0, 0.9)],
            10,
            None,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["c_0", "b_0", "a_1", "b_1"]);
    }

    #[test]
    fn nan_scores_never_outrank_real_ones() {
        let ranked = rank(vec![result("z", 0, f32::NAN), result("a", 0, 0.2)], 5, None);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk.id, "a_0");
    }

    #[test]
    fn threshold_is_a_hard_cutoff() {
        let ranked = rank(vec![result("a", 0, 0.2), result("a", 1, 0.4)], 5, Some(0.3));
        assert_eq!(ranked.len(), 1);
        assert!(rank(vec![result("a", 0, 0.2)], 5, Some(0.3)).is_empty());
        assert!(rank(vec![result("a", 0, 0.9)], 0, None).is_empty());
    }
}
