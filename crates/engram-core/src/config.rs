//! Engine configuration.

use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};

/// Default number of vectors reserved up front.
pub const DEFAULT_RESERVE_VECTORS: usize = 1000;

/// Store size at which [`ScanStrategy::Auto`] switches to the parallel scan.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 16_384;

pub const ENV_SCAN_STRATEGY: &str = "ENGRAM_SCAN_STRATEGY";
pub const ENV_SEARCH_THREADS: &str = "ENGRAM_SEARCH_THREADS";
pub const ENV_PARALLEL_THRESHOLD: &str = "ENGRAM_PARALLEL_THRESHOLD";

/// How a search walks the store.
///
/// Distances agree up to floating-point rounding between the scalar and
/// vectorized kernels, so ids agree too except where two candidates are
/// within that rounding of each other. `Simd` and `Parallel` share a kernel
/// and always return identical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanStrategy {
    /// Vectorized below the parallel threshold, parallel above it.
    #[default]
    Auto,
    /// Single-threaded scan with the sequential scalar kernel.
    Scalar,
    /// Single-threaded scan with the NEON / AVX2 kernel.
    Simd,
    /// Row ranges scanned on rayon workers, partial top-k lists merged.
    Parallel,
}

impl ScanStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Scalar => "scalar",
            Self::Simd => "simd",
            Self::Parallel => "parallel",
        }
    }
}

impl fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "scalar" => Ok(Self::Scalar),
            "simd" => Ok(Self::Simd),
            "parallel" => Ok(Self::Parallel),
            other => Err(EngineError::InvalidConfiguration(format!(
                "unknown scan strategy '{other}' (expected auto, scalar, simd or parallel)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Length every stored vector must have. Fixed for the engine's lifetime.
    pub dimension: usize,
    pub strategy: ScanStrategy,
    /// Minimum store size before `Auto` goes parallel.
    pub parallel_threshold: usize,
    /// Dedicated search pool size. `None` uses the global rayon pool.
    pub threads: Option<usize>,
    pub reserve_vectors: usize,
}

impl EngineConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            strategy: ScanStrategy::Auto,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            threads: None,
            reserve_vectors: DEFAULT_RESERVE_VECTORS,
        }
    }

    /// Build a config from `ENGRAM_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env(dimension: usize) -> Result<Self> {
        Self::from_lookup(dimension, |key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(dimension: usize, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(dimension);

        if let Some(raw) = lookup(ENV_SCAN_STRATEGY) {
            config.strategy = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_SEARCH_THREADS) {
            config.threads = Some(parse_usize(ENV_SEARCH_THREADS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_PARALLEL_THRESHOLD) {
            config.parallel_threshold = parse_usize(ENV_PARALLEL_THRESHOLD, &raw)?;
        }

        Ok(config)
    }

    pub fn with_strategy(mut self, strategy: ScanStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_reserve_vectors(mut self, vectors: usize) -> Self {
        self.reserve_vectors = vectors;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(EngineError::InvalidConfiguration(
                "dimension must be a positive integer".to_string(),
            ));
        }
        // The on-disk header stores the dimension as u32.
        if u32::try_from(self.dimension).is_err() {
            return Err(EngineError::InvalidConfiguration(format!(
                "dimension {} exceeds the supported maximum {}",
                self.dimension,
                u32::MAX
            )));
        }
        if self.threads == Some(0) {
            return Err(EngineError::InvalidConfiguration(
                "search thread count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize> {
    raw.trim().parse().map_err(|_| {
        EngineError::InvalidConfiguration(format!("{key}: '{raw}' is not a non-negative integer"))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ErrorKind;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(384);
        assert_eq!(config.strategy, ScanStrategy::Auto);
        assert_eq!(config.threads, None);
        assert_eq!(config.reserve_vectors, DEFAULT_RESERVE_VECTORS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = EngineConfig::new(0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let err = EngineConfig::new(8).with_threads(0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(
            16,
            lookup(&[
                (ENV_SCAN_STRATEGY, "Parallel"),
                (ENV_SEARCH_THREADS, "3"),
                (ENV_PARALLEL_THRESHOLD, " 512 "),
            ]),
        )
        .unwrap();

        assert_eq!(config.strategy, ScanStrategy::Parallel);
        assert_eq!(config.threads, Some(3));
        assert_eq!(config.parallel_threshold, 512);
    }

    #[test]
    fn test_env_invalid_values() {
        let err = EngineConfig::from_lookup(16, lookup(&[(ENV_SCAN_STRATEGY, "hnsw")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

        let err = EngineConfig::from_lookup(16, lookup(&[(ENV_SEARCH_THREADS, "-1")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_strategy_display_roundtrip() {
        for s in [
            ScanStrategy::Auto,
            ScanStrategy::Scalar,
            ScanStrategy::Simd,
            ScanStrategy::Parallel,
        ] {
            assert_eq!(s.to_string().parse::<ScanStrategy>().unwrap(), s);
        }
    }
}
