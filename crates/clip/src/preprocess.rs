//! Image preprocessing for the CLIP vision encoder.
//!
//! Matches the reference `CLIPProcessor` for ViT-B/32: resize the shortest
//! edge to the input resolution, center-crop to a square, scale to [0, 1]
//! and normalize per channel with the CLIP mean/std.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;

/// Per-channel normalization constants from the CLIP preprocessor config.
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Convert a decoded image into an NCHW `[1, 3, size, size]` tensor.
pub(crate) fn image_tensor(image: &DynamicImage, size: u32) -> Array4<f32> {
    let (w, h) = image.dimensions();

    // Resize shortest edge to the target while preserving aspect ratio.
    let scale = size as f32 / w.min(h).max(1) as f32;
    let new_w = ((w as f32) * scale).round().max(1.0) as u32;
    let new_h = ((h as f32) * scale).round().max(1.0) as u32;
    let resized = image.resize_exact(new_w, new_h, FilterType::CatmullRom);
    let rgb = resized.to_rgb8();

    // Center crop to (size, size).
    let start_x = (rgb.width().saturating_sub(size)) / 2;
    let start_y = (rgb.height().saturating_sub(size)) / 2;

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for y in 0..size as usize {
        let src_y = (start_y + y as u32).min(rgb.height() - 1);
        for x in 0..size as usize {
            let src_x = (start_x + x as u32).min(rgb.width() - 1);
            let pixel = rgb.get_pixel(src_x, src_y);
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y, x]] = (value - CLIP_MEAN[c]) / CLIP_STD[c];
            }
        }
    }
    tensor
}
