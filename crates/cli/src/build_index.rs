//! The offline indexing job.
//!
//! Reads a dataset split (one image file name per line), embeds every image
//! plus the mean of its caption embeddings, and writes the four artifacts
//! the server loads: the image embedding matrix, the averaged caption
//! matrix, the row-ordered names file and the serialized flat index.
//!
//! Images that cannot be read, decoded or captioned are skipped with a
//! warning; the job fails only if nothing at all could be indexed.

use std::collections::BTreeSet;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context};
use ndarray::Array2;

use clip::Embedder;
use index::captions::load_caption_groups;
use index::storage::{
    write_matrix, write_names, EMBEDDINGS_FILE, INDEX_FILE, NAMES_FILE, TEXT_EMBEDDINGS_FILE,
};
use index::FlatIndex;

use crate::EncoderArgs;

#[derive(Debug, clap::Args)]
pub struct BuildIndexArgs {
    /// Directory with the dataset image files
    #[arg(long)]
    pub images_dir: PathBuf,

    /// Split file: one image file name per line
    #[arg(long)]
    pub split_file: PathBuf,

    /// Caption token file (`<image>#<n>\t<caption>` lines)
    #[arg(long)]
    pub captions_file: PathBuf,

    /// Output directory for the serving artifacts
    #[arg(long, default_value = "./artifacts")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub encoder: EncoderArgs,
}

pub fn run(args: BuildIndexArgs) -> anyhow::Result<()> {
    let embedder = args.encoder.build()?;
    let dim = embedder.dimension();

    let split = read_split(&args.split_file)?;
    let groups = load_caption_groups(&args.captions_file)
        .with_context(|| format!("failed to read captions from {}", args.captions_file.display()))?;
    tracing::info!(
        images = split.len(),
        captioned = groups.len(),
        "indexing split"
    );

    let mut names: Vec<String> = Vec::new();
    let mut image_vectors: Vec<Vec<f32>> = Vec::new();
    let mut text_vectors: Vec<Vec<f32>> = Vec::new();

    for name in &split {
        let bytes = match fs::read(args.images_dir.join(name)) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(image = %name, %err, "skipping unreadable image");
                continue;
            }
        };

        let image_vector = match embedder.embed_image(&bytes) {
            Ok(vector) => vector,
            Err(err) => {
                tracing::warn!(image = %name, %err, "skipping image that failed to embed");
                continue;
            }
        };

        let Some(captions) = groups.get(name) else {
            tracing::warn!(image = %name, "skipping image with no captions");
            continue;
        };
        let Some(text_vector) = mean_caption_vector(embedder.as_ref(), name, captions) else {
            continue;
        };

        names.push(name.clone());
        image_vectors.push(image_vector);
        text_vectors.push(text_vector);
    }

    if names.is_empty() {
        bail!("no images could be indexed from {}", args.split_file.display());
    }
    let skipped = split.len() - names.len();
    tracing::info!(indexed = names.len(), skipped, "embedding done");

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let image_matrix = to_matrix(dim, &image_vectors)?;
    let text_matrix = to_matrix(dim, &text_vectors)?;
    write_matrix(&args.out_dir.join(EMBEDDINGS_FILE), &image_matrix)?;
    write_matrix(&args.out_dir.join(TEXT_EMBEDDINGS_FILE), &text_matrix)?;
    write_names(&args.out_dir.join(NAMES_FILE), &names)?;

    let index = FlatIndex::build(dim, image_vectors)?;
    fs::write(args.out_dir.join(INDEX_FILE), index.encode()?)?;

    tracing::info!(out_dir = %args.out_dir.display(), rows = index.len(), "artifacts written");
    println!("indexed {} images into {}", index.len(), args.out_dir.display());
    Ok(())
}

/// Read the split file: sorted, deduplicated image names.
fn read_split(path: &PathBuf) -> anyhow::Result<Vec<String>> {
    let reader = BufReader::new(
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
    );
    let mut names = BTreeSet::new();
    for line in reader.lines() {
        let line = line?;
        let name = line.trim();
        if !name.is_empty() {
            names.insert(name.to_string());
        }
    }
    Ok(names.into_iter().collect())
}

/// Mean of the embeddings of every caption for one image. Captions that
/// fail to embed are dropped; `None` if none survive.
fn mean_caption_vector(
    embedder: &dyn Embedder,
    name: &str,
    captions: &[String],
) -> Option<Vec<f32>> {
    let mut sum = vec![0.0f32; embedder.dimension()];
    let mut count = 0usize;

    for caption in captions {
        match embedder.embed_text(caption) {
            Ok(vector) => {
                for (acc, value) in sum.iter_mut().zip(&vector) {
                    *acc += value;
                }
                count += 1;
            }
            Err(err) => {
                tracing::warn!(image = %name, %err, "dropping caption that failed to embed");
            }
        }
    }

    if count == 0 {
        tracing::warn!(image = %name, "skipping image with no usable captions");
        return None;
    }
    for value in &mut sum {
        *value /= count as f32;
    }
    Some(sum)
}

fn to_matrix(dim: usize, vectors: &[Vec<f32>]) -> anyhow::Result<Array2<f32>> {
    let flat: Vec<f32> = vectors.iter().flatten().copied().collect();
    Array2::from_shape_vec((vectors.len(), dim), flat).context("embedding rows have uneven length")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EncoderArgs;
    use index::Artifacts;
    use std::io::Cursor;

    fn png_bytes(seed: u8) -> Vec<u8> {
        let img = image::RgbImage::from_fn(8, 8, |x, y| image::Rgb([seed, x as u8, y as u8]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn stub_encoder() -> EncoderArgs {
        EncoderArgs {
            model_dir: PathBuf::from("./models"),
            model_name: "clip-vit-base-patch32".to_string(),
            stub: true,
        }
    }

    /// Dataset with three listed images: two real, one missing from disk.
    fn dataset(dir: &std::path::Path) -> BuildIndexArgs {
        let images_dir = dir.join("images");
        fs::create_dir_all(&images_dir).unwrap();
        fs::write(images_dir.join("a.jpg"), png_bytes(1)).unwrap();
        fs::write(images_dir.join("b.jpg"), png_bytes(2)).unwrap();

        let split_file = dir.join("split.txt");
        fs::write(&split_file, "b.jpg\na.jpg\nmissing.jpg\n").unwrap();

        let captions_file = dir.join("tokens.txt");
        fs::write(
            &captions_file,
            "a.jpg#0\tA dog .\na.jpg#1\tA brown dog .\nb.jpg#0\tA cat .\nmissing.jpg#0\tGone .\n",
        )
        .unwrap();

        BuildIndexArgs {
            images_dir,
            split_file,
            captions_file,
            out_dir: dir.join("artifacts"),
            encoder: stub_encoder(),
        }
    }

    #[test]
    fn builds_artifacts_and_skips_missing_images() {
        let tmp = tempfile::tempdir().unwrap();
        let args = dataset(tmp.path());
        let out_dir = args.out_dir.clone();

        run(args).unwrap();

        let artifacts = Artifacts::load(&out_dir).unwrap();
        assert_eq!(artifacts.index.len(), 2);
        // Split iteration is sorted, so rows are a.jpg then b.jpg.
        assert_eq!(artifacts.names.get(0), Some("a.jpg"));
        assert_eq!(artifacts.names.get(1), Some("b.jpg"));

        let text = index::storage::read_matrix(&out_dir.join(TEXT_EMBEDDINGS_FILE)).unwrap();
        assert_eq!(text.nrows(), 2);
        assert_eq!(text.ncols(), artifacts.embeddings.ncols());
    }

    #[test]
    fn text_rows_average_the_caption_embeddings() {
        let tmp = tempfile::tempdir().unwrap();
        let args = dataset(tmp.path());
        let out_dir = args.out_dir.clone();

        run(args).unwrap();

        let embedder = clip::StubEmbedder::new();
        let e0 = embedder.embed_text("A dog .").unwrap();
        let e1 = embedder.embed_text("A brown dog .").unwrap();
        let expected: Vec<f32> = e0.iter().zip(&e1).map(|(a, b)| (a + b) / 2.0).collect();

        let text = index::storage::read_matrix(&out_dir.join(TEXT_EMBEDDINGS_FILE)).unwrap();
        let row: Vec<f32> = text.row(0).to_vec();
        for (got, want) in row.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn empty_split_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut args = dataset(tmp.path());
        fs::write(&args.split_file, "").unwrap();
        args.out_dir = tmp.path().join("artifacts2");

        assert!(run(args).is_err());
    }

    #[test]
    fn uncaptioned_image_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut args = dataset(tmp.path());
        fs::write(&args.captions_file, "a.jpg#0\tA dog .\n").unwrap();
        args.out_dir = tmp.path().join("artifacts3");
        let out_dir = args.out_dir.clone();

        run(args).unwrap();

        let artifacts = Artifacts::load(&out_dir).unwrap();
        assert_eq!(artifacts.index.len(), 1);
        assert_eq!(artifacts.names.get(0), Some("a.jpg"));
    }
}
