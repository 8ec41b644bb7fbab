//! CLIP embedding provider for buscador.
//!
//! Wraps a frozen contrastive vision-language model behind the [`Embedder`]
//! trait: text and images map into the same 512-dimensional space, so a text
//! query can be ranked against an index of image vectors. Two
//! implementations ship:
//!
//! - [`ClipModel`]: ONNX Runtime sessions for the vision and text encoders,
//!   loaded eagerly so a broken deployment fails at startup.
//! - [`StubEmbedder`]: deterministic hash-seeded vectors for tests and
//!   model-less smoke runs; same input validation, no assets required.
//!
//! Vectors are returned exactly as the encoders produce them (no L2
//! normalization), matching the raw-feature + L2-distance ranking the index
//! is built for.

mod config;
mod error;
mod model;
mod preprocess;
mod stub;

pub use config::{get_model_info, ClipConfig, ClipModelInfo, CLIP_MODELS};
pub use error::ClipError;
pub use model::ClipModel;
pub use preprocess::{CLIP_MEAN, CLIP_STD};
pub use stub::StubEmbedder;

/// Dimension of the shared embedding space for the default model.
pub const EMBEDDING_DIM: usize = 512;

/// A frozen encoder mapping text and images into a shared vector space.
///
/// Implementations are stateless per call: no shared mutable state is
/// observable across invocations, and identical inputs yield identical
/// vectors for the lifetime of the process.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a non-empty text query.
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, ClipError>;

    /// Decode raw image bytes and embed the picture.
    fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, ClipError>;
}
