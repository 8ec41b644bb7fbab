//! # buscador index
//!
//! Exact nearest-neighbor search over a fixed set of embedding vectors, plus
//! the persistence layer for the artifacts the offline indexing job produces
//! and the serving process loads read-only at startup:
//!
//! - [`FlatIndex`]: brute-force L2 index; no approximation, no incremental
//!   insert. Built once offline, immutable for the life of the process.
//! - [`storage`]: `.npy` embedding matrices, the row-ordered names file and
//!   the serialized index, with a consistency check across the three.
//! - [`captions`]: display captions keyed by image file name.
//!
//! Distances follow the FAISS `IndexFlatL2` convention: squared Euclidean,
//! so an exact self-match reports distance 0.0.

pub mod captions;
mod error;
pub mod storage;

pub use captions::{CaptionRecord, CaptionStore, NO_CAPTION};
pub use error::IndexError;
pub use storage::{Artifacts, ImageNames};

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};

/// Bump whenever the serialized `FlatIndex` layout changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

/// One search result: the matched row and its squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Row offset of the entry in the index, assigned at build time in
    /// insertion order.
    pub row: usize,
    /// Squared Euclidean distance to the query (lower is closer).
    pub distance: f32,
}

/// Exact (flat) L2 index over a fixed, precomputed set of vectors.
///
/// Rows are stored contiguously; `search` is O(n·d) per query. At the
/// dataset sizes this service targets (a few thousand images) a linear scan
/// answers well under any interactive latency budget, and exactness removes
/// a whole class of recall questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    schema_version: u16,
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Build an index from vectors in insertion order. Every vector must
    /// have the declared dimension.
    pub fn build<I>(dimension: usize, vectors: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = Vec<f32>>,
    {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }

        let mut data = Vec::new();
        for vector in vectors {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    got: vector.len(),
                });
            }
            data.extend_from_slice(&vector);
        }

        log::debug!(
            "built flat index: {} rows x {} dims",
            data.len() / dimension,
            dimension
        );

        Ok(Self {
            schema_version: INDEX_SCHEMA_VERSION,
            dimension,
            data,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow row `i`, if it exists.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        let start = i.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Exact k-nearest-neighbor search, ascending by squared L2 distance.
    ///
    /// Returns exactly `min(k, len)` hits; `k = 0` yields an empty vector.
    /// Equal distances keep insertion order (stable sort).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, vector)| SearchHit {
                row,
                distance: squared_l2(query, vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Serialize for the on-disk artifact.
    pub fn encode(&self) -> Result<Vec<u8>, IndexError> {
        Ok(encode_to_vec(self, standard())?)
    }

    /// Deserialize an artifact produced by [`FlatIndex::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        let (index, read): (Self, usize) = decode_from_slice(bytes, standard())?;
        if read != bytes.len() {
            return Err(IndexError::TrailingBytes {
                trailing: bytes.len() - read,
            });
        }
        if index.schema_version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::SchemaVersion {
                found: index.schema_version,
                expected: INDEX_SCHEMA_VERSION,
            });
        }
        if index.dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(index)
    }
}

/// Squared Euclidean distance between two equal-length vectors.
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn build_rejects_mismatched_vector() {
        let err = FlatIndex::build(3, vec![vec![1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn build_rejects_zero_dimension() {
        assert!(matches!(
            FlatIndex::build(0, Vec::<Vec<f32>>::new()),
            Err(IndexError::ZeroDimension)
        ));
    }

    #[test]
    fn self_match_has_distance_zero() {
        let v0 = vec![0.25, -1.5, 3.0];
        let index = FlatIndex::build(3, vec![v0.clone(), unit(3, 1), unit(3, 2)]).unwrap();
        let hits = index.search(&v0, 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].row, 0);
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn search_is_sorted_non_decreasing() {
        let vectors: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32, 0.0, 0.0]).collect();
        let index = FlatIndex::build(3, vectors).unwrap();
        let hits = index.search(&[7.2, 0.0, 0.0], 20).unwrap();
        assert_eq!(hits.len(), 20);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert_eq!(hits[0].row, 7);
    }

    #[test]
    fn search_returns_min_of_k_and_len() {
        let index =
            FlatIndex::build(2, vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0]]).unwrap();
        assert_eq!(index.search(&[0.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(index.search(&[0.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn search_k_zero_is_empty() {
        let index = FlatIndex::build(2, vec![vec![0.0, 0.0]]).unwrap();
        assert!(index.search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn search_on_empty_index_is_empty() {
        let index = FlatIndex::build(4, Vec::<Vec<f32>>::new()).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[0.0; 4], 5).unwrap().is_empty());
    }

    #[test]
    fn search_rejects_wrong_query_dimension() {
        let index = FlatIndex::build(3, vec![unit(3, 0)]).unwrap();
        let err = index.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    fn equal_distances_keep_insertion_order() {
        // Both rows are at distance 1 from the query.
        let index = FlatIndex::build(2, vec![vec![1.0, 0.0], vec![-1.0, 0.0]]).unwrap();
        let hits = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].row, 0);
        assert_eq!(hits[1].row, 1);
    }

    #[test]
    fn distances_are_squared_l2() {
        let index = FlatIndex::build(2, vec![vec![3.0, 4.0]]).unwrap();
        let hits = index.search(&[0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].distance, 25.0);
    }

    #[test]
    fn encode_decode_preserves_contents() {
        let index = FlatIndex::build(3, vec![unit(3, 0), unit(3, 2)]).unwrap();
        let bytes = index.encode().unwrap();
        let decoded = FlatIndex::decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.dimension(), 3);
        assert_eq!(decoded.row(1), index.row(1));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let index = FlatIndex::build(2, vec![vec![1.0, 2.0]]).unwrap();
        let mut bytes = index.encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            FlatIndex::decode(&bytes),
            Err(IndexError::TrailingBytes { trailing: 1 })
        ));
    }

    #[test]
    fn decode_rejects_future_schema_version() {
        let future = FlatIndex {
            schema_version: INDEX_SCHEMA_VERSION + 1,
            dimension: 2,
            data: vec![0.0, 0.0],
        };
        let bytes = encode_to_vec(&future, standard()).unwrap();
        assert!(matches!(
            FlatIndex::decode(&bytes),
            Err(IndexError::SchemaVersion { .. })
        ));
    }

    #[test]
    fn row_access() {
        let index = FlatIndex::build(2, vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(index.row(0), Some(&[1.0, 2.0][..]));
        assert_eq!(index.row(1), Some(&[3.0, 4.0][..]));
        assert_eq!(index.row(2), None);
    }
}
