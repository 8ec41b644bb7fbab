//! Query execution: embed, rank, attach captions.
//!
//! [`SearchService`] owns everything a query needs after startup: the
//! embedder, the flat index, the row-ordered image names and the caption
//! store. All of it is immutable once constructed, so the service is shared
//! across request handlers without locking.

use std::sync::Arc;

use serde::Serialize;

use clip::Embedder;
use index::{Artifacts, CaptionStore, FlatIndex, ImageNames};

use crate::error::{ServerError, ServerResult};

/// Number of results returned per query.
pub const DEFAULT_TOP_K: usize = 10;

/// One ranked result with its display caption.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedImage {
    /// Image file name, servable under `/imagenes/<name>`.
    pub image_name: String,
    /// Display caption, or the no-caption sentinel.
    pub caption: String,
    /// Squared L2 distance to the query (lower is closer).
    pub distance: f32,
}

/// Read-only retrieval core shared by both query endpoints.
pub struct SearchService {
    embedder: Arc<dyn Embedder>,
    index: FlatIndex,
    names: ImageNames,
    captions: CaptionStore,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("dimension", &self.embedder.dimension())
            .field("images", &self.index.len())
            .field("captions", &self.captions.len())
            .finish_non_exhaustive()
    }
}

impl SearchService {
    /// Assemble the service, rejecting an embedder whose output dimension
    /// does not match the index.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        artifacts: Artifacts,
        captions: CaptionStore,
    ) -> ServerResult<Self> {
        if embedder.dimension() != artifacts.index.dimension() {
            return Err(ServerError::Config(format!(
                "embedder produces {}-dim vectors but the index holds {}-dim rows",
                embedder.dimension(),
                artifacts.index.dimension()
            )));
        }

        tracing::info!(
            images = artifacts.index.len(),
            dimension = artifacts.index.dimension(),
            captions = captions.len(),
            "search service ready"
        );

        Ok(Self {
            embedder,
            index: artifacts.index,
            names: artifacts.names,
            captions,
        })
    }

    /// Number of indexed images.
    pub fn indexed_images(&self) -> usize {
        self.index.len()
    }

    /// Rank the index against a text query.
    pub fn query_by_text(&self, text: &str) -> ServerResult<Vec<RankedImage>> {
        let vector = self.embedder.embed_text(text)?;
        self.rank(&vector, DEFAULT_TOP_K)
    }

    /// Rank the index against an uploaded image.
    pub fn query_by_image(&self, bytes: &[u8]) -> ServerResult<Vec<RankedImage>> {
        let vector = self.embedder.embed_image(bytes)?;
        self.rank(&vector, DEFAULT_TOP_K)
    }

    fn rank(&self, query: &[f32], k: usize) -> ServerResult<Vec<RankedImage>> {
        let hits = self.index.search(query, k)?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            // Row counts were cross-checked at load; a miss here means the
            // artifacts were swapped out from under us.
            let name = self.names.get(hit.row).ok_or_else(|| {
                ServerError::Internal(format!("index row {} has no image name", hit.row))
            })?;
            results.push(RankedImage {
                image_name: name.to_string(),
                caption: self.captions.lookup(name).to_string(),
                distance: hit.distance,
            });
        }
        Ok(results)
    }
}
