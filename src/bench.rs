//! Scan benchmark: a naive compute-everything-then-sort baseline against the
//! engine's bounded top-k scan, one row per scan strategy.

use std::time::{Duration, Instant};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use engram_core::simd::l2_distance_squared_scalar;
use engram_core::{Engine, EngineConfig, ScanStrategy, SearchHit};

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub vectors: usize,
    pub dimension: usize,
    pub k: usize,
    pub queries: usize,
    pub seed: u64,
    pub threads: Option<usize>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            vectors: 100_000,
            dimension: 128,
            k: 10,
            queries: 10,
            seed: 42,
            threads: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyTiming {
    pub strategy: ScanStrategy,
    pub per_query: Duration,
    /// Whether every query returned the same ids as the naive baseline.
    pub matches_baseline: bool,
}

#[derive(Debug, Clone)]
pub struct BenchReport {
    pub config: BenchConfig,
    pub baseline_per_query: Duration,
    pub strategies: Vec<StrategyTiming>,
}

impl BenchReport {
    pub fn speedup(&self, timing: &StrategyTiming) -> f64 {
        self.baseline_per_query.as_secs_f64() / timing.per_query.as_secs_f64().max(f64::EPSILON)
    }
}

pub fn random_vectors(count: usize, dimension: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.gen::<f32>()).collect())
        .collect()
}

/// Reference search: every distance computed, the whole list sorted.
pub fn naive_search(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<SearchHit> {
    let mut all: Vec<SearchHit> = vectors
        .iter()
        .enumerate()
        .map(|(id, v)| SearchHit {
            id: id as u64,
            distance: l2_distance_squared_scalar(v, query).sqrt(),
        })
        .collect();
    all.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
    all.truncate(k);
    all
}

pub fn run(config: &BenchConfig) -> Result<BenchReport> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    tracing::info!(
        "Generating {} random vectors (dim={})",
        config.vectors,
        config.dimension
    );
    let vectors = random_vectors(config.vectors, config.dimension, &mut rng);
    let queries = random_vectors(config.queries.max(1), config.dimension, &mut rng);

    let start = Instant::now();
    let expected: Vec<Vec<u64>> = queries
        .iter()
        .map(|q| naive_search(&vectors, q, config.k).iter().map(|h| h.id).collect())
        .collect();
    let baseline_per_query = start.elapsed() / queries.len() as u32;

    let mut strategies = Vec::new();
    for strategy in [ScanStrategy::Scalar, ScanStrategy::Simd, ScanStrategy::Parallel] {
        let mut engine_config = EngineConfig::new(config.dimension)
            .with_strategy(strategy)
            .with_reserve_vectors(config.vectors);
        if let Some(threads) = config.threads {
            engine_config = engine_config.with_threads(threads);
        }
        let mut engine = Engine::with_config(engine_config)?;
        for v in &vectors {
            engine.insert(v)?;
        }

        let start = Instant::now();
        let mut matches_baseline = true;
        for (query, want) in queries.iter().zip(&expected) {
            let got: Vec<u64> = engine.search(query, config.k)?.iter().map(|h| h.id).collect();
            matches_baseline &= &got == want;
        }
        let per_query = start.elapsed() / queries.len() as u32;

        tracing::debug!("{strategy}: {:?} per query", per_query);
        strategies.push(StrategyTiming {
            strategy,
            per_query,
            matches_baseline,
        });
    }

    Ok(BenchReport {
        config: config.clone(),
        baseline_per_query,
        strategies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naive_search_orders_by_distance_then_id() {
        let vectors = vec![vec![2.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 0.0]];
        let hits = naive_search(&vectors, &[0.0, 0.0], 3);
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn test_small_run_agrees_with_baseline() {
        let report = run(&BenchConfig {
            vectors: 2_000,
            dimension: 8,
            k: 5,
            queries: 3,
            seed: 7,
            threads: Some(2),
        })
        .unwrap();

        assert_eq!(report.strategies.len(), 3);
        let scalar = &report.strategies[0];
        assert_eq!(scalar.strategy, ScanStrategy::Scalar);
        // The scalar kernel is the one the baseline uses.
        assert!(scalar.matches_baseline);
        assert!(report.speedup(scalar) > 0.0);
    }
}
