//! Image codec boundary: bytes → `DynamicImage` and back to JPEG.
//!
//! Raster images only exist in memory while a stage runs; storage and the OCR
//! provider only ever see encoded bytes. JPEG is chosen for the output because
//! OCR providers accept it universally and a binarized page compresses well.
//! Quality stays high (default 90) because blocky artefacts around glyph edges
//! cost more recognition accuracy than the bytes they save.

use crate::error::OcrPrepError;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// Decode image bytes, guessing the format from the content.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, OcrPrepError> {
    let img = image::load_from_memory(bytes).map_err(|e| OcrPrepError::Decode {
        detail: e.to_string(),
    })?;
    debug!("Decoded image → {}x{} px", img.width(), img.height());
    Ok(img)
}

/// Encode `img` as a baseline JPEG at the given quality (1–100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, OcrPrepError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    img.write_with_encoder(encoder)
        .map_err(|e| OcrPrepError::Encode {
            format: "jpeg".into(),
            detail: e.to_string(),
        })?;

    debug!("Encoded image → {} bytes jpeg (q={})", buf.len(), quality);
    Ok(buf)
}
