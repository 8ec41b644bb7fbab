use std::io;
use thiserror::Error;

/// Errors surfaced by the embedding provider.
#[derive(Debug, Error)]
pub enum ClipError {
    /// An encoder ONNX file could not be located locally.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// The tokenizer JSON is missing.
    #[error("tokenizer missing: {0}")]
    TokenizerMissing(String),
    /// Configuration is inconsistent (e.g., unknown model name).
    #[error("invalid clip config: {0}")]
    InvalidConfig(String),
    /// The query text was empty after trimming.
    #[error("query text must be non-empty")]
    EmptyText,
    /// Uploaded bytes did not decode to a raster image.
    #[error("image decode failed: {0}")]
    ImageDecode(String),
    /// ONNX Runtime or tokenizer failures during inference.
    #[error("inference failure: {0}")]
    Inference(String),
    /// Low-level IO failures while touching the filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ClipError {
    /// Whether the error was caused by the caller's input rather than the
    /// provider itself. Request handlers use this to pick a 4xx status.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ClipError::EmptyText | ClipError::ImageDecode(_))
    }
}
