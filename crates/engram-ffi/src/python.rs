use std::sync::Arc;

use parking_lot::RwLock;
use pyo3::exceptions::{PyIOError, PyIndexError, PyValueError};
use pyo3::prelude::*;

use engram_core::{Engine, EngineError, ErrorKind};

fn to_py_err(err: EngineError) -> PyErr {
    match err.kind() {
        ErrorKind::Io => PyIOError::new_err(err.to_string()),
        ErrorKind::NotFound => PyIndexError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

/// Exact in-memory vector index (Python wrapper)
///
/// Args:
///     dimension: Length of every vector stored in the index
#[pyclass(name = "VectorIndex")]
pub struct VectorIndex {
    // Inserts and loads take the write lock; searches share the read lock so
    // several Python threads can query at once with the GIL released.
    engine: Arc<RwLock<Engine>>,
}

#[pymethods]
impl VectorIndex {
    #[new]
    pub fn new(dimension: usize) -> PyResult<Self> {
        let engine = Engine::new(dimension).map_err(to_py_err)?;
        Ok(Self {
            engine: Arc::new(RwLock::new(engine)),
        })
    }

    /// Add a vector to the index
    ///
    /// Returns:
    ///     The id assigned to the vector
    pub fn add_vector(&self, vector: Vec<f32>) -> PyResult<u64> {
        self.engine.write().insert(&vector).map_err(to_py_err)
    }

    /// Search for k-nearest neighbors
    ///
    /// Args:
    ///     query: Query vector (list of floats)
    ///     k: Number of results to return (default: 1)
    ///
    /// Returns:
    ///     List of (id, distance) tuples, closest first
    #[pyo3(signature = (query, k=1))]
    pub fn search(&self, py: Python<'_>, query: Vec<f32>, k: i64) -> PyResult<Vec<(u64, f32)>> {
        if k <= 0 {
            return Err(PyValueError::new_err(format!(
                "k must be a positive integer, got {k}"
            )));
        }
        let k = usize::try_from(k).map_err(|e| PyValueError::new_err(e.to_string()))?;

        let engine = self.engine.clone();
        let hits = py
            .allow_threads(move || engine.read().search(&query, k))
            .map_err(to_py_err)?;

        Ok(hits.into_iter().map(|h| (h.id, h.distance)).collect())
    }

    /// Save index to disk
    pub fn save_index(&self, py: Python<'_>, path: String) -> PyResult<()> {
        let engine = self.engine.clone();
        py.allow_threads(move || engine.read().save(&path))
            .map_err(to_py_err)
    }

    /// Load index from disk, replacing the current contents
    pub fn load_index(&self, py: Python<'_>, path: String) -> PyResult<()> {
        let engine = self.engine.clone();
        py.allow_threads(move || engine.write().load(&path))
            .map_err(to_py_err)
    }

    #[getter]
    pub fn count(&self) -> usize {
        self.engine.read().count()
    }

    #[getter]
    pub fn dimension(&self) -> usize {
        self.engine.read().dimension()
    }

    fn __len__(&self) -> usize {
        self.count()
    }

    fn __repr__(&self) -> String {
        let engine = self.engine.read();
        format!(
            "VectorIndex(dimension={}, count={})",
            engine.dimension(),
            engine.count()
        )
    }
}

/// Engram: a fast exact vector index
#[pymodule]
fn engram(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<VectorIndex>()?;
    Ok(())
}
