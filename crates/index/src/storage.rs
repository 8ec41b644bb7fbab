//! On-disk artifact layout shared by the offline job and the server.
//!
//! The indexing job writes four files into one directory; the serving
//! process loads three of them read-only at startup:
//!
//! - `image_embeddings.npy`: f32 matrix, shape (N, dim), row i = image i.
//! - `text_embeddings.npy`: f32 matrix of averaged caption embeddings,
//!   same row order (offline evaluation only, not loaded by the server).
//! - `image_names.txt`: N lines, one image file name per line, order
//!   matching the matrix rows.
//! - `flat_l2.index`: serialized [`FlatIndex`] over the same rows.
//!
//! The names list and the embedding rows are parallel arrays: they are
//! written together by the job and never mutated independently. `load`
//! refuses artifacts whose row counts disagree.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use hashbrown::HashMap;
use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};

use crate::{FlatIndex, IndexError};

pub const EMBEDDINGS_FILE: &str = "image_embeddings.npy";
pub const TEXT_EMBEDDINGS_FILE: &str = "text_embeddings.npy";
pub const NAMES_FILE: &str = "image_names.txt";
pub const INDEX_FILE: &str = "flat_l2.index";

/// Row-ordered image names with an O(1) name → row map built once at load.
#[derive(Debug, Clone, Default)]
pub struct ImageNames {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl ImageNames {
    pub fn from_names(names: Vec<String>) -> Self {
        let by_name = names
            .iter()
            .enumerate()
            .map(|(row, name)| (name.clone(), row))
            .collect();
        Self { names, by_name }
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let reader = BufReader::new(File::open(path)?);
        let mut names = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let name = line.trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
        Ok(Self::from_names(names))
    }

    /// Name at `row`, if in range.
    pub fn get(&self, row: usize) -> Option<&str> {
        self.names.get(row).map(String::as_str)
    }

    /// Row for `name`. Hash lookup; the O(n) scan this replaces showed up
    /// in evaluation runs.
    pub fn row_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Write an embedding matrix as `.npy`.
pub fn write_matrix(path: &Path, matrix: &Array2<f32>) -> Result<(), IndexError> {
    let writer = BufWriter::new(File::create(path)?);
    matrix.write_npy(writer)?;
    Ok(())
}

/// Read an `.npy` embedding matrix.
pub fn read_matrix(path: &Path) -> Result<Array2<f32>, IndexError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(Array2::<f32>::read_npy(reader)?)
}

/// Write the row-ordered names file.
pub fn write_names(path: &Path, names: &[String]) -> Result<(), IndexError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for name in names {
        writeln!(writer, "{name}")?;
    }
    writer.flush()?;
    Ok(())
}

/// The artifact set the serving process works from.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub embeddings: Array2<f32>,
    pub names: ImageNames,
    pub index: FlatIndex,
}

impl Artifacts {
    /// Load and cross-check the three serving artifacts from `dir`.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let embeddings = read_matrix(&dir.join(EMBEDDINGS_FILE))?;
        let names = ImageNames::load(&dir.join(NAMES_FILE))?;
        let index = FlatIndex::decode(&fs::read(dir.join(INDEX_FILE))?)?;

        if embeddings.nrows() != names.len() || names.len() != index.len() {
            return Err(IndexError::ArtifactMismatch {
                embeddings: embeddings.nrows(),
                names: names.len(),
                index: index.len(),
            });
        }
        if embeddings.ncols() != index.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimension(),
                got: embeddings.ncols(),
            });
        }

        log::info!(
            "artifacts loaded: {} images, dim {}",
            index.len(),
            index.dimension()
        );
        Ok(Self {
            embeddings,
            names,
            index,
        })
    }
}
