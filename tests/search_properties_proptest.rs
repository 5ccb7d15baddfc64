//! Property-based tests for the exact search contract
//!
//! Vectors use small integer components so every squared distance is exact
//! and the scan strategies can be compared id for id.

use engram_db::bench::naive_search;
use engram_db::{Engine, EngineConfig, ErrorKind, ScanStrategy, SearchHit};
use proptest::prelude::*;
use tempfile::tempdir;

/// Strategy for a dimension and a list of integer-valued vectors of that
/// dimension.
fn integer_vectors(max_count: usize) -> impl Strategy<Value = (usize, Vec<Vec<f32>>)> {
    (1..8usize).prop_flat_map(move |dim| {
        (
            Just(dim),
            prop::collection::vec(
                prop::collection::vec((-8i8..=8).prop_map(f32::from), dim),
                0..max_count,
            ),
        )
    })
}

fn query_for(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec((-8i8..=8).prop_map(f32::from), dim)
}

fn engine_with(dim: usize, strategy: ScanStrategy, vectors: &[Vec<f32>]) -> Engine {
    let mut engine = Engine::with_config(EngineConfig::new(dim).with_strategy(strategy)).unwrap();
    for v in vectors {
        engine.insert(v).unwrap();
    }
    engine
}

fn ids(hits: &[SearchHit]) -> Vec<u64> {
    hits.iter().map(|h| h.id).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: ids are assigned 0, 1, 2, ... in insertion order
    #[test]
    fn ids_follow_insertion_order((dim, vectors) in integer_vectors(40)) {
        let mut engine = Engine::new(dim).unwrap();
        for (i, v) in vectors.iter().enumerate() {
            prop_assert_eq!(engine.insert(v).unwrap(), i as u64);
        }
        prop_assert_eq!(engine.count(), vectors.len());
        for (i, v) in vectors.iter().enumerate() {
            prop_assert_eq!(engine.get(i as u64).unwrap(), v.as_slice());
        }
    }

    /// Property: a vector of the wrong length never changes the store
    #[test]
    fn wrong_length_insert_is_rejected(
        (dim, vectors) in integer_vectors(10),
        extra in 1..4usize,
    ) {
        let mut engine = engine_with(dim, ScanStrategy::Auto, &vectors);
        let before = engine.store().as_flat().to_vec();

        let err = engine.insert(&vec![0.0; dim + extra]).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        if dim > 1 {
            let err = engine.insert(&vec![0.0; dim - 1]).unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        }

        prop_assert_eq!(engine.count(), vectors.len());
        prop_assert_eq!(engine.store().as_flat(), before.as_slice());
    }

    /// Property: results are the min(k, count) nearest, ordered by distance
    /// then id, with no repeats
    #[test]
    fn results_are_ordered_and_exact(
        (dim, vectors, query) in integer_vectors(60)
            .prop_flat_map(|(dim, vectors)| (Just(dim), Just(vectors), query_for(dim))),
        k in 1..20usize,
    ) {
        let engine = engine_with(dim, ScanStrategy::Auto, &vectors);
        let hits = engine.search(&query, k).unwrap();

        prop_assert_eq!(hits.len(), k.min(vectors.len()));
        for pair in hits.windows(2) {
            prop_assert!(
                pair[0].distance < pair[1].distance
                    || (pair[0].distance == pair[1].distance && pair[0].id < pair[1].id),
                "out of order: {:?} then {:?}", pair[0], pair[1]
            );
        }

        prop_assert_eq!(ids(&hits), ids(&naive_search(&vectors, &query, k)));
    }

    /// Property: every stored vector finds itself at distance zero, behind
    /// only earlier duplicates of itself
    #[test]
    fn stored_vector_is_its_own_nearest((dim, vectors) in integer_vectors(30)) {
        let engine = engine_with(dim, ScanStrategy::Auto, &vectors);
        for (i, v) in vectors.iter().enumerate() {
            let first_copy = vectors.iter().position(|w| w == v).unwrap();
            let hits = engine.search(v, 1).unwrap();
            prop_assert_eq!(hits[0].distance, 0.0);
            prop_assert_eq!(hits[0].id, first_copy as u64, "query was id {}", i);
        }
    }

    /// Property: save then load reproduces the store and its answers
    #[test]
    fn save_load_preserves_answers(
        (dim, vectors, query) in integer_vectors(50)
            .prop_flat_map(|(dim, vectors)| (Just(dim), Just(vectors), query_for(dim))),
        checksum in any::<bool>(),
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prop.engram");

        let engine = engine_with(dim, ScanStrategy::Auto, &vectors);
        engine
            .save_with(&path, engram_db::SaveOptions { checksum })
            .unwrap();

        let mut restored = Engine::new(dim).unwrap();
        restored.load(&path).unwrap();
        prop_assert_eq!(restored.count(), vectors.len());
        prop_assert_eq!(restored.store().as_flat(), engine.store().as_flat());
        prop_assert_eq!(restored.search(&query, 5).unwrap(), engine.search(&query, 5).unwrap());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: the scalar, vectorized and multi-worker scans return the
    /// same ids, including collections large enough to be split across tasks
    #[test]
    fn strategies_agree(
        (dim, vectors, query) in integer_vectors(5_000)
            .prop_flat_map(|(dim, vectors)| (Just(dim), Just(vectors), query_for(dim))),
        k in 1..50usize,
    ) {
        let reference = engine_with(dim, ScanStrategy::Scalar, &vectors)
            .search(&query, k)
            .unwrap();

        for strategy in [ScanStrategy::Simd, ScanStrategy::Parallel, ScanStrategy::Auto] {
            let hits = engine_with(dim, strategy, &vectors).search(&query, k).unwrap();
            prop_assert_eq!(ids(&hits), ids(&reference), "strategy {}", strategy);
        }
    }
}
