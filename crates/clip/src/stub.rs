use fxhash::hash64;

use crate::{ClipError, Embedder, EMBEDDING_DIM};

/// Deterministic stand-in for the real model. Generates sinusoid values
/// derived from a hash of the input, so repeated calls on the same bytes
/// yield bit-identical vectors with minimal CPU cost. Input validation is
/// identical to [`crate::ClipModel`]: empty text and undecodable image
/// bytes are rejected, which keeps request-error paths testable without
/// model assets on disk.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    dim: usize,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self { dim: EMBEDDING_DIM }
    }

    pub fn with_dimension(dim: usize) -> Self {
        Self { dim }
    }

    fn vector_for(&self, payload: &[u8]) -> Vec<f32> {
        let h = hash64(payload);
        let mut v = vec![0f32; self.dim];
        for (idx, value) in v.iter_mut().enumerate() {
            *value = ((h >> (idx % 32)) as f32 * 0.0001).sin();
        }
        v
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for StubEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, ClipError> {
        if text.trim().is_empty() {
            return Err(ClipError::EmptyText);
        }
        Ok(self.vector_for(text.as_bytes()))
    }

    fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, ClipError> {
        // Decode to enforce the same DecodeError contract as the real model.
        image::load_from_memory(bytes).map_err(|e| ClipError::ImageDecode(e.to_string()))?;
        Ok(self.vector_for(bytes))
    }
}
