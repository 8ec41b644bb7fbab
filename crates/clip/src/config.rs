use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ClipError;

/// Known CLIP exports with verified HuggingFace URLs. The URLs are surfaced
/// in error hints only; downloading is left to the operator.
#[derive(Debug, Clone)]
pub struct ClipModelInfo {
    /// Model identifier.
    pub name: &'static str,
    /// URL for the vision encoder ONNX export.
    pub vision_url: &'static str,
    /// URL for the text encoder ONNX export.
    pub text_url: &'static str,
    /// URL for the tokenizer JSON (BPE).
    pub tokenizer_url: &'static str,
    /// Output embedding dimension.
    pub dims: usize,
    /// Input image resolution (square).
    pub input_resolution: u32,
    /// Tokenizer context length.
    pub context_length: usize,
}

/// Registry of supported models. A single entry today; the shape leaves room
/// for swapping in another contrastive encoder with the same contract.
pub static CLIP_MODELS: &[ClipModelInfo] = &[ClipModelInfo {
    name: "clip-vit-base-patch32",
    vision_url: "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main/onnx/vision_model.onnx",
    text_url: "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main/onnx/text_model.onnx",
    tokenizer_url: "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main/tokenizer.json",
    dims: 512,
    input_resolution: 224,
    context_length: 77,
}];

/// Look up a registry entry by name.
pub fn get_model_info(name: &str) -> Result<&'static ClipModelInfo, ClipError> {
    CLIP_MODELS
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| ClipError::InvalidConfig(format!("unknown clip model '{name}'")))
}

/// Runtime configuration describing where the frozen encoder assets live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipConfig {
    /// Registry name of the model to load.
    pub model_name: String,
    /// Directory holding `<model>_vision.onnx`, `<model>_text.onnx` and
    /// `<model>_tokenizer.json`.
    pub models_dir: PathBuf,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            model_name: "clip-vit-base-patch32".into(),
            models_dir: PathBuf::from("./models"),
        }
    }
}

impl ClipConfig {
    pub fn vision_path(&self) -> PathBuf {
        self.models_dir
            .join(format!("{}_vision.onnx", self.model_name))
    }

    pub fn text_path(&self) -> PathBuf {
        self.models_dir.join(format!("{}_text.onnx", self.model_name))
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.models_dir
            .join(format!("{}_tokenizer.json", self.model_name))
    }
}

/// Build the operator-facing hint for a missing asset.
pub(crate) fn download_hint(url: &str, target: &Path) -> String {
    format!("download it manually: curl -L '{}' -o '{}'", url, target.display())
}
