//! Last-resort raster backend.
//!
//! Paints the template (or plain white) onto a fresh pixel buffer and
//! stamps each line in the built-in bitmap face. Needs nothing from the
//! host, so its probe never fails.

use std::ops::Range;

use async_trait::async_trait;
use certificate_core::metrics::MM_PER_PT;
use certificate_core::{DrawInstruction, PageDescription, Weight};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tracing::debug;

use super::glyphs::{glyph, is_set, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use super::{decode_template, encode_raster, px_per_mm};
use crate::artifact::RenderedArtifact;
use crate::backend::{BackendKind, Probe, RenderBackend, RenderContext};
use crate::error::BackendError;

pub const BACKEND_NAME: &str = "synthetic-canvas";

const INK: Rgb<u8> = Rgb([20, 20, 20]);
const PAPER: Rgb<u8> = Rgb([255, 255, 255]);
/// Cap height as a fraction of the em
const CAP_HEIGHT: f32 = 0.72;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticCanvasBackend;

impl SyntheticCanvasBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl RenderBackend for SyntheticCanvasBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Synthetic
    }

    async fn probe(&self) -> Probe {
        Probe::Available
    }

    async fn execute(
        &self,
        page: &PageDescription,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedArtifact, BackendError> {
        let pixels = paint(page, ctx.params.scale)?;
        let (kind, bytes) =
            encode_raster(&pixels, ctx.params.raster_format, ctx.params.jpeg_quality())?;
        Ok(RenderedArtifact::new(kind, bytes, BACKEND_NAME))
    }
}

/// Paint the page into an RGB buffer at `scale` times CSS resolution
pub fn paint(page: &PageDescription, scale: f32) -> Result<RgbImage, BackendError> {
    let ppm = px_per_mm(scale);
    let width = (page.page.width_mm * ppm).round() as u32;
    let height = (page.page.height_mm * ppm).round() as u32;
    if width == 0 || height == 0 {
        return Err(BackendError::Execution(format!(
            "Canvas would be {}x{} px",
            width, height
        )));
    }

    let mut canvas = match &page.background {
        Some(template) => {
            let pixels = decode_template(template)?;
            imageops::resize(&pixels, width, height, FilterType::Triangle)
        }
        None => RgbImage::from_pixel(width, height, PAPER),
    };

    for instruction in &page.instructions {
        stamp(&mut canvas, instruction, ppm);
    }

    debug!(width, height, lines = page.instructions.len(), "Painted synthetic canvas");
    Ok(canvas)
}

/// Stamp one line in the bitmap face. The face is wider than Helvetica,
/// so a line that would overrun its box is squeezed horizontally until it
/// ends inside `max_width_mm`.
fn stamp(canvas: &mut RgbImage, instruction: &DrawInstruction, ppm: f32) {
    let cap_px = instruction.size_pt * MM_PER_PT * CAP_HEIGHT * ppm;
    let unit = ((cap_px / GLYPH_HEIGHT as f32).round() as u32).max(1);
    let strike = match instruction.weight {
        Weight::Normal => 0,
        Weight::Bold => (unit / 2).max(1),
    };

    let left = (instruction.x_mm * ppm).round() as i64;
    let budget = ((instruction.max_width_mm * ppm).floor() as i64).min(canvas.width() as i64 - left);
    let chars = instruction.text.chars().count() as u32;
    if chars == 0 || budget <= 0 {
        return;
    }
    let right = left + budget;

    // Glyph columns from the first inked column to the last
    let columns = chars * ADVANCE - (ADVANCE - GLYPH_WIDTH);
    let natural = (columns * unit + strike) as i64;
    let column_px = if natural <= budget {
        unit as f32
    } else {
        (budget - strike as i64).max(1) as f32 / columns as f32
    };

    let baseline = (instruction.y_mm * ppm).round() as i64;
    let top = baseline - (GLYPH_HEIGHT * unit) as i64;

    for (i, c) in instruction.text.chars().enumerate() {
        let g = glyph(c);
        for row in 0..GLYPH_HEIGHT {
            for col in 0..GLYPH_WIDTH {
                if !is_set(&g, col, row) {
                    continue;
                }
                let column = i as u32 * ADVANCE + col;
                let x0 = left + (column as f32 * column_px).floor() as i64;
                let x1 = (left + ((column + 1) as f32 * column_px).ceil() as i64 + strike as i64)
                    .max(x0 + 1)
                    .min(right);
                let y0 = top + (row * unit) as i64;
                fill(canvas, x0..x1, y0..y0 + unit as i64);
            }
        }
    }
}

fn fill(canvas: &mut RgbImage, xs: Range<i64>, ys: Range<i64>) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    for y in ys.start.max(0)..ys.end.min(ch) {
        for x in xs.start.max(0)..xs.end.min(cw) {
            canvas.put_pixel(x as u32, y as u32, INK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendParams;
    use certificate_core::{CertificateRecord, Composer, Field, RasterFormat};
    use proptest::prelude::*;

    fn dark_pixels(canvas: &RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) -> usize {
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|&(x, y)| canvas.get_pixel(x, y).0[0] < 128)
            .count()
    }

    #[test]
    fn test_canvas_matches_page_at_scale() {
        let page = Composer::default().preview(&CertificateRecord::new());
        let canvas = paint(&page, 2.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (1587, 2245));
        assert_eq!(dark_pixels(&canvas, 0, 0, 1587, 2245), 0);
    }

    #[test]
    fn test_text_is_inked_above_baseline() {
        let page = Composer::default()
            .compose(&CertificateRecord::sample(), None)
            .unwrap();
        let canvas = paint(&page, 1.0).unwrap();
        let ppm = px_per_mm(1.0);

        let client = page
            .instructions
            .iter()
            .find(|i| i.field == Field::Client)
            .unwrap();
        let x = (client.x_mm * ppm) as u32;
        let y = (client.y_mm * ppm) as u32;
        assert!(dark_pixels(&canvas, x, y - 12, x + 60, y) > 0);
        assert_eq!(dark_pixels(&canvas, x, y + 2, x + 60, y + 10), 0);
    }

    /// Ink painted at or right of the line's box, with the line drawn alone
    fn ink_past_box(page: &PageDescription, instruction: &DrawInstruction, scale: f32) -> usize {
        let alone = PageDescription {
            page: page.page,
            background: None,
            instructions: vec![instruction.clone()],
        };
        let canvas = paint(&alone, scale).unwrap();
        let ppm = px_per_mm(scale);
        let limit = ((instruction.x_mm + instruction.max_width_mm) * ppm).ceil() as u32 + 1;
        dark_pixels(&canvas, limit.min(canvas.width()), 0, canvas.width(), canvas.height())
    }

    fn long_lines(record: &CertificateRecord) -> (PageDescription, Vec<DrawInstruction>) {
        let page = Composer::default().compose(record, None).unwrap();
        let lines = page
            .instructions
            .iter()
            .filter(|i| matches!(i.field, Field::Description | Field::Observations))
            .cloned()
            .collect();
        (page, lines)
    }

    #[test]
    fn test_narrow_letters_stay_inside_their_box() {
        let record = CertificateRecord::sample()
            .with(Field::Description, "i".repeat(200))
            .with(Field::Observations, "l".repeat(600));
        let (page, lines) = long_lines(&record);
        assert!(lines.len() > 1);

        for instruction in &lines {
            assert_eq!(ink_past_box(&page, instruction, 2.0), 0, "{:?}", instruction.field);
        }

        // The description box ends well before the next column at 150mm
        let description = lines.iter().find(|i| i.field == Field::Description).unwrap();
        assert!(description.x_mm + description.max_width_mm <= 150.0);
    }

    #[test]
    fn test_short_line_keeps_natural_width() {
        let page = Composer::default()
            .compose(&CertificateRecord::sample(), None)
            .unwrap();
        let client = page
            .instructions
            .iter()
            .find(|i| i.field == Field::Client)
            .unwrap();
        let alone = PageDescription {
            page: page.page,
            background: None,
            instructions: vec![client.clone()],
        };
        let canvas = paint(&alone, 1.0).unwrap();
        let ppm = px_per_mm(1.0);
        let x = (client.x_mm * ppm).round() as u32;
        let y = (client.y_mm * ppm).round() as u32;

        let cap_px = client.size_pt * MM_PER_PT * CAP_HEIGHT * ppm;
        let unit = ((cap_px / GLYPH_HEIGHT as f32).round() as u32).max(1);
        let chars = client.text.chars().count() as u32;
        let span = chars * ADVANCE * unit;
        assert!(dark_pixels(&canvas, x, 0, x + span, y + 1) > 0);
        assert_eq!(dark_pixels(&canvas, x + span, 0, canvas.width(), canvas.height()), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_long_values_never_ink_past_their_box(
            description in "[il.,' WM]{1,300}",
            observations in "[il.,' WMáñ]{1,900}",
            scale in prop_oneof![Just(1.0f32), Just(2.0f32)],
        ) {
            let record = CertificateRecord::sample()
                .with(Field::Description, description)
                .with(Field::Observations, observations);
            let (page, lines) = long_lines(&record);
            for instruction in &lines {
                prop_assert!(instruction.x_mm + instruction.max_width_mm <= page.page.width_mm);
                prop_assert_eq!(ink_past_box(&page, instruction, scale), 0);
            }
        }
    }

    #[tokio::test]
    async fn test_backend_honours_raster_format() {
        let backend = SyntheticCanvasBackend::new();
        assert_eq!(backend.probe().await, Probe::Available);

        let page = Composer::default()
            .compose(&CertificateRecord::sample(), None)
            .unwrap();
        let mut params = BackendParams::default();
        params.scale = 1.0;
        params.raster_format = RasterFormat::Jpeg;
        let artifact = backend
            .execute(&page, &RenderContext::detached(params))
            .await
            .unwrap();
        assert_eq!(artifact.mime_type(), "image/jpeg");

        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (794, 1123));
    }
}
