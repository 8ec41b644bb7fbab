//! ONNX-backed CLIP encoders.
//!
//! Both sessions and the tokenizer are loaded eagerly in [`ClipModel::new`]
//! so that a missing or corrupt asset aborts startup instead of failing the
//! first request. Sessions sit behind a `Mutex` because `ort` takes `&mut`
//! to run; inference therefore serializes per encoder.

use ndarray::Array;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{
    PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer, TruncationDirection,
    TruncationParams, TruncationStrategy,
};

use crate::config::{download_hint, get_model_info, ClipConfig, ClipModelInfo};
use crate::preprocess::image_tensor;
use crate::{ClipError, Embedder};

/// Frozen CLIP model with separate vision and text encoders.
pub struct ClipModel {
    model_info: &'static ClipModelInfo,
    vision_session: Mutex<Session>,
    text_session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl std::fmt::Debug for ClipModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipModel")
            .field("model", &self.model_info.name)
            .finish_non_exhaustive()
    }
}

impl ClipModel {
    /// Load all encoder assets. Fails fast when any file is missing or
    /// rejected by the runtime.
    pub fn new(config: &ClipConfig) -> Result<Self, ClipError> {
        let model_info = get_model_info(&config.model_name)?;

        let vision_path = config.vision_path();
        let text_path = config.text_path();
        let tokenizer_path = config.tokenizer_path();

        let vision_session = load_session(&vision_path, model_info.vision_url)?;
        tracing::info!(model = model_info.name, path = %vision_path.display(), "vision encoder loaded");
        let text_session = load_session(&text_path, model_info.text_url)?;
        tracing::info!(model = model_info.name, path = %text_path.display(), "text encoder loaded");
        let tokenizer = load_tokenizer(&tokenizer_path, model_info)?;
        tracing::info!(model = model_info.name, path = %tokenizer_path.display(), "tokenizer loaded");

        Ok(Self {
            model_info,
            vision_session: Mutex::new(vision_session),
            text_session: Mutex::new(text_session),
            tokenizer,
        })
    }

    pub fn model_info(&self) -> &'static ClipModelInfo {
        self.model_info
    }

    fn encode_text(&self, text: &str) -> Result<Vec<f32>, ClipError> {
        if text.trim().is_empty() {
            return Err(ClipError::EmptyText);
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ClipError::Inference(format!("text tokenization failed: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let seq_len = input_ids.len();

        let ids_array = Array::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| ClipError::Inference(e.to_string()))?;
        let mask_array = Array::from_shape_vec((1, seq_len), attention_mask)
            .map_err(|e| ClipError::Inference(e.to_string()))?;

        let mut session = self
            .text_session
            .lock()
            .map_err(|_| ClipError::Inference("text session lock poisoned".into()))?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "text_embeds".into());

        let ids_tensor = Tensor::from_array(ids_array)
            .map_err(|e| ClipError::Inference(format!("input_ids tensor: {e}")))?;
        let mask_tensor = Tensor::from_array(mask_array)
            .map_err(|e| ClipError::Inference(format!("attention_mask tensor: {e}")))?;

        let outputs = if input_names.len() >= 2 {
            session
                .run(ort::inputs![
                    input_names[0].clone() => ids_tensor,
                    input_names[1].clone() => mask_tensor
                ])
                .map_err(|e| ClipError::Inference(format!("text inference failed: {e}")))?
        } else {
            let name = input_names
                .first()
                .cloned()
                .unwrap_or_else(|| "input_ids".to_string());
            session
                .run(ort::inputs![name => ids_tensor])
                .map_err(|e| ClipError::Inference(format!("text inference failed: {e}")))?
        };

        let output = outputs
            .get(&output_name)
            .ok_or_else(|| ClipError::Inference(format!("no output '{output_name}' from text model")))?;
        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ClipError::Inference(format!("failed to extract text embedding: {e}")))?;
        validate_vector(data.to_vec())
    }

    fn encode_image(&self, bytes: &[u8]) -> Result<Vec<f32>, ClipError> {
        let image =
            image::load_from_memory(bytes).map_err(|e| ClipError::ImageDecode(e.to_string()))?;
        let pixel_values = image_tensor(&image, self.model_info.input_resolution);

        let mut session = self
            .vision_session
            .lock()
            .map_err(|_| ClipError::Inference("vision session lock poisoned".into()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "pixel_values".into());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "image_embeds".into());

        let input_tensor = Tensor::from_array(pixel_values)
            .map_err(|e| ClipError::Inference(format!("pixel_values tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![input_name => input_tensor])
            .map_err(|e| ClipError::Inference(format!("vision inference failed: {e}")))?;

        let output = outputs
            .get(&output_name)
            .ok_or_else(|| ClipError::Inference(format!("no output '{output_name}' from vision model")))?;
        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ClipError::Inference(format!("failed to extract image embedding: {e}")))?;
        validate_vector(data.to_vec())
    }
}

impl Embedder for ClipModel {
    fn dimension(&self) -> usize {
        self.model_info.dims
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, ClipError> {
        let vector = self.encode_text(text)?;
        tracing::debug!(text_len = text.len(), dims = vector.len(), "text embedded");
        Ok(vector)
    }

    fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, ClipError> {
        let vector = self.encode_image(bytes)?;
        tracing::debug!(input_bytes = bytes.len(), dims = vector.len(), "image embedded");
        Ok(vector)
    }
}

fn load_session(path: &Path, url: &str) -> Result<Session, ClipError> {
    if !path.exists() {
        return Err(ClipError::ModelNotFound(format!(
            "{}; {}",
            path.display(),
            download_hint(url, path)
        )));
    }

    Session::builder()
        .map_err(|e| ClipError::Inference(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| ClipError::Inference(e.to_string()))?
        // Single intra-op thread keeps float reductions in a fixed order, so
        // identical inputs produce bit-identical vectors.
        .with_intra_threads(1)
        .map_err(|e| ClipError::Inference(e.to_string()))?
        .commit_from_file(path)
        .map_err(|e| ClipError::Inference(format!("failed to load {}: {e}", path.display())))
}

fn load_tokenizer(path: &Path, info: &ClipModelInfo) -> Result<Tokenizer, ClipError> {
    if !path.exists() {
        return Err(ClipError::TokenizerMissing(format!(
            "{}; {}",
            path.display(),
            download_hint(info.tokenizer_url, path)
        )));
    }

    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| ClipError::Inference(format!("failed to load tokenizer: {e}")))?;

    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::Fixed(info.context_length),
        direction: PaddingDirection::Right,
        pad_to_multiple_of: None,
        pad_id: 49407,
        pad_type_id: 0,
        pad_token: "<|endoftext|>".to_string(),
    }));

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: info.context_length,
            strategy: TruncationStrategy::LongestFirst,
            stride: 0,
            direction: TruncationDirection::Right,
        }))
        .map_err(|e| ClipError::Inference(format!("failed to apply truncation config: {e}")))?;

    Ok(tokenizer)
}

fn validate_vector(vector: Vec<f32>) -> Result<Vec<f32>, ClipError> {
    if vector.is_empty() {
        return Err(ClipError::Inference("model returned an empty embedding".into()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(ClipError::Inference(
            "embedding contains non-finite values".into(),
        ));
    }
    Ok(vector)
}
