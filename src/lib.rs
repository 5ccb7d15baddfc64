//! Engram-DB: an exact vector similarity index for retrieval pipelines
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        engram-db CLI: ingest · search · stats · bench       │
//! │           Python `engram` module · C API (engram-ffi)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Engine (engram-core)                    │
//! │      bounded top-k scan · SIMD kernels · rayon split        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    .engram file (format)                    │
//! │            header + row-major f32 · atomic save             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bench;
pub mod ingest;

pub use engram_core::{config, engine, error, format, search, simd, store};
pub use engram_core::{
    Engine, EngineConfig, EngineError, ErrorKind, IndexHeader, MappedIndex, SaveOptions,
    ScanStrategy, SearchHit, VectorStore,
};
