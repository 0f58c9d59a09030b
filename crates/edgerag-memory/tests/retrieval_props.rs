// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordering and bound properties of vector store search.

use edgerag_memory::{MemoryChunk, VectorStore, cosine_similarity};
use proptest::prelude::*;

const DIMS: usize = 4;

fn arb_vector() -> impl Strategy<Value = Vec<f32>> {
    // Small integer grid so equal scores actually occur.
    prop::collection::vec((-3i8..=3).prop_map(f32::from), DIMS)
}

fn build_store(vectors: &[Vec<f32>]) -> VectorStore {
    let mut store = VectorStore::new(DIMS);
    for (i, v) in vectors.iter().enumerate() {
        store
            .insert(MemoryChunk::new(format!("chunk-{i}"), v.clone()))
            .unwrap();
    }
    store
}

fn position(text: &str) -> usize {
    text.trim_start_matches("chunk-").parse().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn results_are_bounded_filtered_and_sorted(
        vectors in prop::collection::vec(arb_vector(), 0..24),
        query in arb_vector(),
        k in 0usize..8,
        threshold in prop_oneof![Just(-1.0f32), Just(0.0f32), Just(0.5f32)],
    ) {
        let store = build_store(&vectors);
        let hits = store.search(&query, k, threshold);

        prop_assert!(hits.len() <= k);
        for hit in &hits {
            prop_assert!(hit.score >= threshold);
        }
        for pair in hits.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                prop_assert!(position(&pair[0].chunk.text) < position(&pair[1].chunk.text));
            }
        }
    }

    #[test]
    fn nothing_better_is_left_out(
        vectors in prop::collection::vec(arb_vector(), 1..24),
        query in arb_vector(),
        k in 1usize..8,
    ) {
        let store = build_store(&vectors);
        let hits = store.search(&query, k, f32::MIN);

        if hits.len() == k {
            let worst = hits[k - 1].score;
            let better = vectors
                .iter()
                .filter(|v| cosine_similarity(&query, v) > worst)
                .count();
            prop_assert!(better < k);
        } else {
            prop_assert_eq!(hits.len(), vectors.len());
        }
    }

    #[test]
    fn zero_k_is_always_empty(
        vectors in prop::collection::vec(arb_vector(), 0..24),
        query in arb_vector(),
    ) {
        let store = build_store(&vectors);
        prop_assert!(store.search(&query, 0, -1.0).is_empty());
    }
}
