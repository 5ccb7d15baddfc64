//! Error types surfaced by the engine.

use std::io;

use thiserror::Error;

use crate::format::FormatError;

/// Coarse error category, for callers that branch on the kind of failure
/// rather than its details (bindings, CLI exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfiguration,
    DimensionMismatch,
    InvalidArgument,
    NotFound,
    Format,
    Io,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("vector id {id} not found (count is {count})")]
    NotFound { id: u64, count: usize },

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Format(_) => ErrorKind::Format,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
