//! Pixel-level helpers shared by the raster backends and the PDF writer.

pub mod glyphs;
pub mod synthetic;

use std::io::Cursor;

use certificate_core::metrics::MM_PER_PT;
use certificate_core::{RasterFormat, TemplateImage};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::RgbImage;

use crate::artifact::ArtifactKind;
use crate::error::BackendError;

pub use synthetic::SyntheticCanvasBackend;

/// CSS reference resolution
pub const CSS_DPI: f32 = 96.0;

/// Pixels per millimetre at CSS resolution times `scale`
pub fn px_per_mm(scale: f32) -> f32 {
    CSS_DPI / 25.4 * scale
}

/// Points per millimetre
pub fn pt_per_mm() -> f32 {
    1.0 / MM_PER_PT
}

/// Decode the template into RGB pixels
pub fn decode_template(template: &TemplateImage) -> Result<RgbImage, BackendError> {
    image::load_from_memory(&template.bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| BackendError::Execution(format!("Failed to decode template: {}", e)))
}

pub fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    pixels
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        .map_err(|e| BackendError::Encoding(e.to_string()))?;
    Ok(out)
}

pub fn encode_png(pixels: &RgbImage) -> Result<Vec<u8>, BackendError> {
    let mut out = Cursor::new(Vec::new());
    pixels
        .write_with_encoder(PngEncoder::new(&mut out))
        .map_err(|e| BackendError::Encoding(e.to_string()))?;
    Ok(out.into_inner())
}

/// Encode in the configured raster format
pub fn encode_raster(
    pixels: &RgbImage,
    format: RasterFormat,
    quality: u8,
) -> Result<(ArtifactKind, Vec<u8>), BackendError> {
    match format {
        RasterFormat::Png => Ok((ArtifactKind::Png, encode_png(pixels)?)),
        RasterFormat::Jpeg => Ok((ArtifactKind::Jpeg, encode_jpeg(pixels, quality)?)),
    }
}
