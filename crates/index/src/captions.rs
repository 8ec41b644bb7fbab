//! Display captions for indexed images.
//!
//! The Flickr8k token file carries several captions per image, one per line:
//!
//! ```text
//! 1000268201_693b08cb0e.jpg#0\tA child in a pink dress is climbing ...
//! 1000268201_693b08cb0e.jpg#1\tA girl going into a wooden building .
//! ```
//!
//! The serving-side store keeps the first caption per base image id; the
//! remaining captions only matter to the offline job, which averages their
//! embeddings. Lookups never fail: unknown ids resolve to [`NO_CAPTION`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use hashbrown::HashMap;

use crate::IndexError;

/// Sentinel returned for images without a stored caption.
pub const NO_CAPTION: &str = "Sin descripción";

/// One parsed caption line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionRecord {
    /// Base image file name, e.g. `1000268201_693b08cb0e.jpg`.
    pub image_id: String,
    /// Full caption id including the per-image counter, e.g. `...jpg#1`.
    pub caption_id: String,
    /// Caption text.
    pub text: String,
}

/// Parse a single `<image_id>#<n>\t<caption>` line. Malformed lines yield
/// `None` and are skipped by every consumer.
pub fn parse_line(line: &str) -> Option<CaptionRecord> {
    let line = line.trim();
    let (caption_id, text) = line.split_once('\t')?;
    let caption_id = caption_id.trim();
    let text = text.trim();
    if caption_id.is_empty() || text.is_empty() {
        return None;
    }
    let image_id = caption_id.split('#').next().unwrap_or(caption_id);
    if image_id.is_empty() {
        return None;
    }
    Some(CaptionRecord {
        image_id: image_id.to_string(),
        caption_id: caption_id.to_string(),
        text: text.to_string(),
    })
}

/// Read-only caption table keyed by base image id, first caption wins.
#[derive(Debug, Clone, Default)]
pub struct CaptionStore {
    by_image: HashMap<String, String>,
}

impl CaptionStore {
    /// Build from any line source. Duplicate ids keep the first caption
    /// encountered; later lines for the same image are ignored.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, IndexError> {
        let mut by_image: HashMap<String, String> = HashMap::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            match parse_line(&line) {
                Some(record) => {
                    by_image.entry(record.image_id).or_insert(record.text);
                }
                None => {
                    if !line.trim().is_empty() {
                        skipped += 1;
                    }
                }
            }
        }

        if skipped > 0 {
            log::warn!("caption file: skipped {skipped} malformed lines");
        }
        log::debug!("caption store loaded: {} images", by_image.len());

        Ok(Self { by_image })
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// Caption for `image_id`, or the sentinel when absent. Never fails.
    pub fn lookup(&self, image_id: &str) -> &str {
        self.by_image
            .get(image_id)
            .map(String::as_str)
            .unwrap_or(NO_CAPTION)
    }

    pub fn len(&self) -> usize {
        self.by_image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_image.is_empty()
    }
}

/// All captions per base image id, in file order. Used by the offline job
/// to average caption embeddings; the serving store above keeps only the
/// first one.
pub fn load_caption_groups(path: &Path) -> Result<HashMap<String, Vec<String>>, IndexError> {
    let reader = BufReader::new(File::open(path)?);
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(record) = parse_line(&line) {
            groups.entry(record.image_id).or_default().push(record.text);
        }
    }
    Ok(groups)
}
