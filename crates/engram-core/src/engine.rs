//! The owned index engine.
//!
//! ```text
//! Engine::new(dim) ──► insert()* ──► search()* / save() / load()
//! ```
//!
//! An `Engine` takes `&mut self` for mutations (insert, load) and `&self` for
//! reads (search, save), so the borrow checker already enforces the
//! single-writer contract within one thread. Sharing across threads means
//! wrapping it in a reader-writer lock.

use std::path::Path;

use rayon::ThreadPool;

use crate::config::{EngineConfig, ScanStrategy};
use crate::error::{EngineError, Result};
use crate::format::{self, MappedIndex};
use crate::search::{self, SearchHit};
use crate::simd::select_l2_squared;
use crate::store::VectorStore;

/// Options for [`Engine::save_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Append a CRC-32 trailer (format version 2).
    pub checksum: bool,
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: VectorStore,
    /// Dedicated search pool when `config.threads` is set.
    pool: Option<ThreadPool>,
}

impl Engine {
    /// Create an empty engine for vectors of length `dimension`.
    pub fn new(dimension: usize) -> Result<Self> {
        Self::with_config(EngineConfig::new(dimension))
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let store = VectorStore::with_capacity(config.dimension, config.reserve_vectors)?;
        let pool = match config.threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|idx| format!("engram-search-{idx}"))
                    .build()
                    .map_err(|e| {
                        EngineError::InvalidConfiguration(format!("building search pool: {e}"))
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            config,
            store,
            pool,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.store.count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Append a vector, returning its id (the number of vectors stored before
    /// it).
    pub fn insert(&mut self, vector: &[f32]) -> Result<u64> {
        self.store.insert(vector).map(|id| id as u64)
    }

    /// Look up a stored vector by id.
    pub fn get(&self, id: u64) -> Result<&[f32]> {
        let index = usize::try_from(id).map_err(|_| EngineError::NotFound {
            id,
            count: self.count(),
        })?;
        self.store.get(index)
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// The `min(k, count)` stored vectors closest to `query`, nearest first.
    ///
    /// Equal distances are ordered by ascending id. An empty engine returns
    /// an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension() {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        if k == 0 {
            return Err(EngineError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }
        if self.store.is_empty() {
            return Ok(Vec::new());
        }

        let strategy = self.resolve_strategy();
        tracing::trace!(
            strategy = %strategy,
            count = self.count(),
            k,
            "exact scan"
        );

        let data = self.store.as_flat();
        let dim = self.dimension();
        let hits = match strategy {
            ScanStrategy::Scalar => {
                search::search_sequential(data, dim, query, k, select_l2_squared(false))
            }
            ScanStrategy::Simd => {
                search::search_sequential(data, dim, query, k, select_l2_squared(true))
            }
            ScanStrategy::Parallel | ScanStrategy::Auto => search::search_parallel(
                self.pool.as_ref(),
                data,
                dim,
                query,
                k,
                select_l2_squared(true),
            ),
        };
        Ok(hits)
    }

    fn resolve_strategy(&self) -> ScanStrategy {
        match self.config.strategy {
            ScanStrategy::Auto if self.count() >= self.config.parallel_threshold => {
                ScanStrategy::Parallel
            }
            ScanStrategy::Auto => ScanStrategy::Simd,
            explicit => explicit,
        }
    }

    /// Persist every vector to `path` in the plain (version 1) layout.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.save_with(path, SaveOptions::default())
    }

    /// Persist every vector to `path`.
    ///
    /// The file is written beside `path` and renamed into place, so an
    /// existing file survives any failure untouched.
    pub fn save_with<P: AsRef<Path>>(&self, path: P, options: SaveOptions) -> Result<()> {
        let path = path.as_ref();
        // validate() already guaranteed the dimension fits.
        let dimensions = self.dimension() as u32;
        format::write_index_atomic(path, dimensions, self.store.as_flat(), options.checksum)?;

        tracing::debug!(
            "saved {} vectors (dim {}) to {:?}",
            self.count(),
            self.dimension(),
            path
        );
        Ok(())
    }

    /// Replace the whole store with the contents of `path`.
    ///
    /// The file must have been written with this engine's dimension. On any
    /// error the current contents are left untouched.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mapped = MappedIndex::open(path)?;
        let header = *mapped.header();

        if header.dimensions as usize != self.dimension() {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension(),
                actual: header.dimensions as usize,
            });
        }

        let data = mapped.decode_vectors()?;
        drop(mapped);
        self.store.replace_all(data, self.dimension())?;

        tracing::debug!(
            "loaded {} vectors (dim {}, format v{}) from {:?}",
            self.count(),
            self.dimension(),
            header.version,
            path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn unit_axes() -> Engine {
        let mut engine = Engine::new(3).unwrap();
        engine.insert(&[1.0, 0.0, 0.0]).unwrap();
        engine.insert(&[0.0, 1.0, 0.0]).unwrap();
        engine.insert(&[0.0, 0.0, 1.0]).unwrap();
        engine
    }

    #[test]
    fn test_new_engine_is_empty() {
        let engine = Engine::new(128).unwrap();
        assert_eq!(engine.dimension(), 128);
        assert_eq!(engine.count(), 0);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_very_wide_dimension_does_not_preallocate_everything() {
        let mut engine = Engine::new(1usize << 31).unwrap();
        assert_eq!(engine.dimension(), 1usize << 31);
        assert!(engine.store().memory_bytes() <= crate::store::MAX_RESERVE_BYTES);

        let err = engine.insert(&[1.0, 2.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    }

    #[test]
    fn test_zero_dimension() {
        let err = Engine::new(0).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_insert_returns_sequential_ids() {
        let mut engine = Engine::new(2).unwrap();
        for expected in 0..10u64 {
            assert_eq!(engine.insert(&[expected as f32, 1.0]).unwrap(), expected);
        }
        assert_eq!(engine.get(7).unwrap(), &[7.0, 1.0]);
        assert_eq!(engine.get(10).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_search_validates_arguments() {
        let engine = unit_axes();

        let err = engine.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        let err = engine.search(&[1.0, 0.0, 0.0], 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_search_empty_engine_still_validates_query() {
        let engine = Engine::new(3).unwrap();
        assert!(engine.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
        assert!(engine.search(&[1.0, 0.0], 5).is_err());
    }

    #[test]
    fn test_every_strategy_agrees() {
        let dim = 16;
        let strategies = [
            ScanStrategy::Auto,
            ScanStrategy::Scalar,
            ScanStrategy::Simd,
            ScanStrategy::Parallel,
        ];
        let mut engines: Vec<Engine> = strategies
            .iter()
            .map(|&s| {
                Engine::with_config(EngineConfig::new(dim).with_strategy(s).with_threads(2)).unwrap()
            })
            .collect();

        // Small integers keep every kernel exact, so ties are real ties and
        // must all resolve by id.
        for i in 0..3_000 {
            let v: Vec<f32> = (0..dim).map(|j| ((i * 31 + j * 7) % 13) as f32).collect();
            for engine in &mut engines {
                engine.insert(&v).unwrap();
            }
        }

        let query: Vec<f32> = (0..dim).map(|j| (j % 5) as f32).collect();
        let reference = engines[1].search(&query, 25).unwrap();
        assert_eq!(reference.len(), 25);
        for engine in &engines {
            assert_eq!(engine.search(&query, 25).unwrap(), reference);
        }
    }

    #[test]
    fn test_auto_switches_on_threshold() {
        let config = EngineConfig::new(2).with_parallel_threshold(3);
        let mut engine = Engine::with_config(config).unwrap();
        engine.insert(&[0.0, 0.0]).unwrap();
        assert_eq!(engine.resolve_strategy(), ScanStrategy::Simd);
        engine.insert(&[1.0, 0.0]).unwrap();
        engine.insert(&[2.0, 0.0]).unwrap();
        assert_eq!(engine.resolve_strategy(), ScanStrategy::Parallel);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let engine = unit_axes();

        for checksum in [false, true] {
            let path = dir.path().join(format!("axes-{checksum}.engram"));
            engine.save_with(&path, SaveOptions { checksum }).unwrap();

            let mut loaded = Engine::new(3).unwrap();
            loaded.load(&path).unwrap();
            assert_eq!(loaded.count(), 3);
            assert_eq!(loaded.store().as_flat(), engine.store().as_flat());
        }
    }

    #[test]
    fn test_load_replaces_existing_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("axes.engram");
        unit_axes().save(&path).unwrap();

        let mut engine = Engine::new(3).unwrap();
        for _ in 0..5 {
            engine.insert(&[9.0, 9.0, 9.0]).unwrap();
        }
        engine.load(&path).unwrap();
        assert_eq!(engine.count(), 3);
        assert_eq!(engine.get(2).unwrap(), &[0.0, 0.0, 1.0]);
        assert_eq!(engine.insert(&[1.0, 1.0, 1.0]).unwrap(), 3);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let mut engine = unit_axes();
        let err = engine.load(dir.path().join("nope.engram")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(engine.count(), 3);
    }
}
