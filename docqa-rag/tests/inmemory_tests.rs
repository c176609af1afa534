//! Property tests for in-memory vector store search ordering.

use std::collections::HashMap;

use docqa_rag::document::{Chunk, IndexEntry};
use docqa_rag::inmemory::InMemoryVectorStore;
use docqa_rag::similarity::{SimilarityMetric, rank_order};
use docqa_rag::vectorstore::VectorStore;
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate an entry with a normalized embedding.
fn arb_entry(dim: usize) -> impl Strategy<Value = IndexEntry> {
    ("[a-c]", 0usize..8, "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(document_id, sequence_index, text, embedding)| {
            IndexEntry::new(
                Chunk {
                    id: Chunk::make_id(&document_id, sequence_index),
                    offset_start: 0,
                    offset_end: text.len(),
                    text,
                    sequence_index,
                    metadata: HashMap::new(),
                    document_id,
                },
                embedding,
            )
        },
    )
}

fn store_with(dim: usize, entries: &[IndexEntry]) -> (InMemoryVectorStore, usize) {
    let mut deduped: HashMap<String, IndexEntry> = HashMap::new();
    for entry in entries {
        deduped.entry(entry.chunk.id.clone()).or_insert_with(|| entry.clone());
    }
    let unique: Vec<IndexEntry> = deduped.into_values().collect();
    let store = InMemoryVectorStore::new(dim, SimilarityMetric::Cosine);
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(store.upsert_batch(&unique)).unwrap();
    (store, unique.len())
}

/// *For any* set of entries and query, search returns results in rank order
/// (score descending, ties by sequence index then document ID), and the
/// number of results is at most `top_k`.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ranked_and_bounded_by_top_k(
            entries in proptest::collection::vec(arb_entry(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 0usize..25,
        ) {
            let (store, unique_count) = store_with(DIM, &entries);
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(store.search(&query, top_k, None)).unwrap();

            prop_assert!(results.len() <= top_k);
            prop_assert_eq!(results.len(), top_k.min(unique_count));

            for pair in results.windows(2) {
                prop_assert!(
                    rank_order(&pair[0], &pair[1]).is_le(),
                    "results not in rank order: {} ({}) before {} ({})",
                    pair[0].chunk.id, pair[0].score, pair[1].chunk.id, pair[1].score,
                );
            }
        }
    }
}

/// *For any* threshold, every returned score is at least the threshold, and
/// no entry at or above it is left out when `top_k` covers the whole store.
mod prop_inmemory_threshold {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn threshold_is_a_lower_bound(
            entries in proptest::collection::vec(arb_entry(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            threshold in -1.0f32..1.0f32,
        ) {
            let (store, unique_count) = store_with(DIM, &entries);
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(store.search(&query, unique_count, Some(threshold))).unwrap();
            prop_assert!(results.iter().all(|r| r.score >= threshold));

            let unfiltered = rt.block_on(store.search(&query, unique_count, None)).unwrap();
            let expected = unfiltered.iter().filter(|r| r.score >= threshold).count();
            prop_assert_eq!(results.len(), expected);
        }
    }
}
