//! Normalization chain: turn an upload into an OCR-friendly image.
//!
//! ```text
//! bytes ─▶ decode ─▶ rotate(angle, white) ─▶ fit ≤ max_long_edge ─▶ gray
//!       ─▶ sharpen ─▶ threshold ─▶ JPEG
//! ```
//!
//! Every stage runs on every image; there is no conditional skipping apart
//! from "don't enlarge". Any failure aborts the whole chain, so callers either
//! get a complete result or an error, never a half-processed image.

use crate::config::PipelineConfig;
use crate::error::OcrPrepError;
use crate::naming::OUTPUT_CONTENT_TYPE;
use crate::pipeline::encode::{decode_image, encode_jpeg};
use crate::pipeline::transform::{binarize, fit_within, grayscale, rotate_with_fill, sharpen};
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Output of the normalization chain, ready to be uploaded.
#[derive(Debug, Clone)]
pub struct PreprocessingResult {
    /// Rotation that was applied, in degrees.
    pub angle: f32,
    /// Encoded output.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub content_type: &'static str,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
}

/// Run the full chain on encoded image bytes.
pub fn normalize(
    bytes: &[u8],
    angle: f32,
    config: &PipelineConfig,
) -> Result<PreprocessingResult, OcrPrepError> {
    let img = decode_image(bytes)?;
    normalize_image(&img, angle, config)
}

/// Run the chain on an already decoded image.
pub fn normalize_image(
    img: &DynamicImage,
    angle: f32,
    config: &PipelineConfig,
) -> Result<PreprocessingResult, OcrPrepError> {
    let rotated = rotate_with_fill(img, angle);
    let fitted = fit_within(&rotated, config.max_long_edge, FilterType::Lanczos3);
    let gray = grayscale(&fitted);
    let sharp = sharpen(&gray);
    let binary = binarize(&sharp);
    let (width, height) = binary.dimensions();

    debug!(
        angle,
        from = format!("{}x{}", img.width(), img.height()),
        to = format!("{width}x{height}"),
        "Normalized image"
    );

    let bytes = encode_jpeg(&DynamicImage::ImageLuma8(binary), config.jpeg_quality)?;

    Ok(PreprocessingResult {
        angle,
        bytes,
        content_type: OUTPUT_CONTENT_TYPE,
        width,
        height,
    })
}
