//! Append-only flat vector storage
//!
//! All vectors live in one contiguous row-major `Vec<f32>`:
//!
//! ```text
//! [v0[0], v0[1], .., v0[d-1], v1[0], .., v1[d-1], ..]
//! ```
//!
//! A vector's id is its row index. Rows are only ever appended, or replaced
//! wholesale by [`VectorStore::replace_all`].

use crate::error::{EngineError, Result};

/// Upper bound on the capacity reserved before the first insert.
pub const MAX_RESERVE_BYTES: usize = 64 << 20;

#[derive(Debug)]
pub struct VectorStore {
    data: Vec<f32>,
    dim: usize,
    count: usize,
}

impl VectorStore {
    pub fn new(dim: usize) -> Result<Self> {
        Self::with_capacity(dim, 0)
    }

    /// Create an empty store with room for `vectors` rows before reallocating.
    ///
    /// The up-front reservation is capped at [`MAX_RESERVE_BYTES`]; past that
    /// the buffer grows on insert.
    pub fn with_capacity(dim: usize, vectors: usize) -> Result<Self> {
        if dim == 0 {
            return Err(EngineError::InvalidConfiguration(
                "dimension must be a positive integer".to_string(),
            ));
        }

        let floats = vectors
            .saturating_mul(dim)
            .min(MAX_RESERVE_BYTES / std::mem::size_of::<f32>());
        let mut data = Vec::new();
        data.try_reserve_exact(floats).map_err(|e| {
            EngineError::InvalidConfiguration(format!(
                "cannot reserve {} vectors of dimension {}: {}",
                vectors, dim, e
            ))
        })?;

        Ok(Self {
            data,
            dim,
            count: 0,
        })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append a vector and return its id.
    ///
    /// A vector of the wrong length is rejected before anything is touched.
    pub fn insert(&mut self, values: &[f32]) -> Result<usize> {
        if values.len() != self.dim {
            return Err(EngineError::DimensionMismatch {
                expected: self.dim,
                actual: values.len(),
            });
        }
        let id = self.count;
        self.data.extend_from_slice(values);
        self.count += 1;
        Ok(id)
    }

    pub fn get(&self, id: usize) -> Result<&[f32]> {
        if id >= self.count {
            return Err(EngineError::NotFound {
                id: id as u64,
                count: self.count,
            });
        }
        let start = id * self.dim;
        Ok(&self.data[start..start + self.dim])
    }

    /// Row-major view of every stored component, in id order.
    #[inline]
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Swap in a complete new set of rows.
    ///
    /// `data` must hold a whole number of `dim`-length rows. On error the
    /// current contents are kept as they were.
    pub fn replace_all(&mut self, data: Vec<f32>, dim: usize) -> Result<()> {
        if dim == 0 {
            return Err(EngineError::InvalidConfiguration(
                "dimension must be a positive integer".to_string(),
            ));
        }
        if data.len() % dim != 0 {
            return Err(EngineError::InvalidArgument(format!(
                "{} components do not form whole vectors of dimension {}",
                data.len(),
                dim
            )));
        }

        self.count = data.len() / dim;
        self.dim = dim;
        self.data = data;
        Ok(())
    }

    /// Heap bytes held by vector data, including spare capacity.
    pub fn memory_bytes(&self) -> usize {
        self.data.capacity() * std::mem::size_of::<f32>()
    }
}
