//! Retrieval-quality evaluation against expert annotations.
//!
//! The annotation file pairs images with caption ids judged relevant by
//! human experts (Flickr8k `ExpertAnnotations.txt` format: image name,
//! caption id, then the expert scores). For every pair the caption text is
//! embedded and ranked against the image index; the report gives Top-1 and
//! Top-5 hit rates plus the mean rank of the annotated image.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context};
use hashbrown::HashMap;

use clip::Embedder;
use index::captions::parse_line;
use index::Artifacts;

use crate::EncoderArgs;

#[derive(Debug, clap::Args)]
pub struct EvaluateArgs {
    /// Directory with the serving artifacts
    #[arg(long, default_value = "./artifacts")]
    pub artifact_dir: PathBuf,

    /// Caption token file (`<image>#<n>\t<caption>` lines)
    #[arg(long)]
    pub captions_file: PathBuf,

    /// Expert annotation file pairing images with relevant caption ids
    #[arg(long)]
    pub annotations_file: PathBuf,

    #[command(flatten)]
    pub encoder: EncoderArgs,
}

/// One image/caption pair to score.
#[derive(Debug, PartialEq, Eq)]
struct AnnotationPair {
    image_id: String,
    caption_id: String,
}

/// Aggregated evaluation results.
#[derive(Debug)]
pub struct Report {
    pub evaluated: usize,
    pub skipped: usize,
    pub top1: usize,
    pub top5: usize,
    pub mean_rank: f64,
}

pub fn run(args: EvaluateArgs) -> anyhow::Result<()> {
    let embedder = args.encoder.build()?;
    let artifacts = Artifacts::load(&args.artifact_dir)
        .with_context(|| format!("failed to load artifacts from {}", args.artifact_dir.display()))?;
    let captions = captions_by_id(&args.captions_file)?;
    let pairs = read_annotations(&args.annotations_file)?;
    tracing::info!(pairs = pairs.len(), images = artifacts.index.len(), "evaluating");

    let mut evaluated = 0usize;
    let mut skipped = 0usize;
    let mut top1 = 0usize;
    let mut top5 = 0usize;
    let mut rank_sum = 0u64;

    for pair in &pairs {
        let Some(text) = captions.get(&pair.caption_id) else {
            skipped += 1;
            continue;
        };
        let Some(target_row) = artifacts.names.row_of(&pair.image_id) else {
            skipped += 1;
            continue;
        };

        let vector = embedder.embed_text(text)?;
        let hits = artifacts.index.search(&vector, artifacts.index.len())?;
        let rank = hits
            .iter()
            .position(|hit| hit.row == target_row)
            .map(|pos| pos + 1)
            .unwrap_or(hits.len());

        if rank == 1 {
            top1 += 1;
        }
        if rank <= 5 {
            top5 += 1;
        }
        rank_sum += rank as u64;
        evaluated += 1;
    }

    if evaluated == 0 {
        bail!("no annotation pair could be evaluated against the index");
    }

    let report = Report {
        evaluated,
        skipped,
        top1,
        top5,
        mean_rank: rank_sum as f64 / evaluated as f64,
    };
    print_report(&report);
    Ok(())
}

fn print_report(report: &Report) {
    let pct = |n: usize| 100.0 * n as f64 / report.evaluated as f64;
    println!("evaluated pairs : {}", report.evaluated);
    println!("skipped pairs   : {}", report.skipped);
    println!("top-1 accuracy  : {:.2}% ({})", pct(report.top1), report.top1);
    println!("top-5 accuracy  : {:.2}% ({})", pct(report.top5), report.top5);
    println!("mean rank       : {:.2}", report.mean_rank);
}

/// Caption text keyed by full caption id (`<image>#<n>`).
fn captions_by_id(path: &PathBuf) -> anyhow::Result<HashMap<String, String>> {
    let reader = BufReader::new(
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
    );
    let mut map = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(record) = parse_line(&line) {
            map.insert(record.caption_id, record.text);
        }
    }
    Ok(map)
}

/// Parse the annotation file: image name and caption id are the first two
/// whitespace-separated fields, expert scores follow.
fn read_annotations(path: &PathBuf) -> anyhow::Result<Vec<AnnotationPair>> {
    let reader = BufReader::new(
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
    );
    let mut pairs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(pair) = parse_annotation_line(&line) {
            pairs.push(pair);
        }
    }
    Ok(pairs)
}

fn parse_annotation_line(line: &str) -> Option<AnnotationPair> {
    let mut fields = line.split_whitespace();
    let image_id = fields.next()?;
    let caption_id = fields.next()?;
    if !caption_id.contains('#') {
        return None;
    }
    Some(AnnotationPair {
        image_id: image_id.to_string(),
        caption_id: caption_id.to_string(),
    })
}
