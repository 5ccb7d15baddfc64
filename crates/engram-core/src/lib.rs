//! Engram Core – exact vector similarity index
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │        insert · search · save / load · count                │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │   Exact top-k (search)       │   .engram codec (format)     │
//! │   bounded heap · rayon split │   mmap read · atomic write   │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │        Distance kernels (simd): scalar · NEON · AVX2        │
//! ├─────────────────────────────────────────────────────────────┤
//! │            VectorStore: flat row-major Vec<f32>             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use engram_core::Engine;
//!
//! let mut engine = Engine::new(3)?;
//! engine.insert(&[1.0, 0.0, 0.0])?;
//! engine.insert(&[0.0, 1.0, 0.0])?;
//!
//! let hits = engine.search(&[0.9, 0.1, 0.0], 1)?;
//! assert_eq!(hits[0].id, 0);
//! # Ok::<(), engram_core::EngineError>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod search;
pub mod simd;
pub mod store;

pub use config::{EngineConfig, ScanStrategy};
pub use engine::{Engine, SaveOptions};
pub use error::{EngineError, ErrorKind, Result};
pub use format::{FormatError, IndexHeader, MappedIndex};
pub use search::SearchHit;
pub use simd::{l2_distance, l2_distance_squared};
pub use store::VectorStore;
