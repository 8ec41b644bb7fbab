use std::io;

use bincode::error::{DecodeError, EncodeError};
use ndarray_npy::{ReadNpyError, WriteNpyError};
use thiserror::Error;

/// Errors produced while building, searching or persisting the index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("index dimension must be non-zero")]
    ZeroDimension,

    #[error("unsupported index schema version {found} (expected {expected})")]
    SchemaVersion { found: u16, expected: u16 },

    #[error("index payload has {trailing} trailing bytes")]
    TrailingBytes { trailing: usize },

    #[error("artifact row counts disagree: embeddings={embeddings}, names={names}, index={index}")]
    ArtifactMismatch {
        embeddings: usize,
        names: usize,
        index: usize,
    },

    #[error("failed to encode index: {0}")]
    Encode(#[from] EncodeError),

    #[error("failed to decode index: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to read npy matrix: {0}")]
    NpyRead(#[from] ReadNpyError),

    #[error("failed to write npy matrix: {0}")]
    NpyWrite(#[from] WriteNpyError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
