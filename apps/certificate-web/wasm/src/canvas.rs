//! `dom-canvas`: redraws the composed page onto an offscreen canvas sized
//! from the measured preview sheet.

use async_trait::async_trait;
use certificate_core::{PageDescription, PageSize, RasterFormat, Weight};
use certificate_render::{
    ArtifactKind, BackendError, BackendKind, Probe, RenderBackend, RenderContext,
    RenderedArtifact, TargetSize,
};
use tracing::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crate::dataurl;
use crate::dom::{document, js_error, SharedElements};

pub const BACKEND_NAME: &str = "dom-canvas";

const INK: &str = "#141414";
const FONT_STACK: &str = "Helvetica, Arial, sans-serif";
const MM_PER_PT: f64 = 25.4 / 72.0;

/// Canvas export MIME type and encoder quality for the configured format
pub fn export_format(format: RasterFormat, quality: f32) -> (ArtifactKind, &'static str, f64) {
    match format {
        RasterFormat::Png => (ArtifactKind::Png, "image/png", 1.0),
        RasterFormat::Jpeg => (ArtifactKind::Jpeg, "image/jpeg", quality as f64),
    }
}

/// Device pixels for a target measured in CSS pixels
pub fn canvas_size(target: TargetSize, scale: f32) -> (u32, u32) {
    let scale = scale as f64;
    (
        (target.width * scale).round().max(1.0) as u32,
        (target.height * scale).round().max(1.0) as u32,
    )
}

/// Pixels per millimetre along each axis when the page is stretched over
/// a `width` by `height` canvas
pub fn page_scale(page: &PageSize, width: u32, height: u32) -> (f64, f64) {
    (
        width as f64 / page.width_mm as f64,
        height as f64 / page.height_mm as f64,
    )
}

/// CSS font shorthand for one instruction at `px_per_mm`
pub fn font_for(weight: Weight, size_pt: f32, px_per_mm: f64) -> String {
    let size_px = size_pt as f64 * MM_PER_PT * px_per_mm;
    let weight = match weight {
        Weight::Bold => "bold",
        Weight::Normal => "normal",
    };
    format!("{} {:.2}px {}", weight, size_px, FONT_STACK)
}

pub(crate) fn new_canvas(width: u32, height: u32) -> Result<(HtmlCanvasElement, CanvasRenderingContext2d), JsValue> {
    let canvas: HtmlCanvasElement = document()?.create_element("canvas")?.dyn_into()?;
    canvas.set_width(width);
    canvas.set_height(height);
    let context: CanvasRenderingContext2d = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
        .dyn_into()?;
    Ok((canvas, context))
}

/// Export the canvas. Reading back a canvas that drew a cross-origin
/// image throws, which is reported as tainted.
pub(crate) fn export_canvas(
    canvas: &HtmlCanvasElement,
    format: RasterFormat,
    quality: f32,
    backend: &str,
) -> Result<RenderedArtifact, BackendError> {
    let (kind, mime, encoder_quality) = export_format(format, quality);
    let url = canvas
        .to_data_url_with_type_and_encoder_options(mime, &JsValue::from_f64(encoder_quality))
        .map_err(|e| {
            let message = js_error(&e);
            match e.dyn_ref::<web_sys::DomException>().map(|d| d.name()) {
                Some(name) if name == "SecurityError" => BackendError::Tainted(message),
                _ => BackendError::Encoding(message),
            }
        })?;
    let decoded = dataurl::decode(&url).map_err(|e| BackendError::Encoding(e.to_string()))?;
    Ok(RenderedArtifact::new(kind, decoded.bytes, backend))
}

pub struct CanvasRedrawBackend {
    elements: SharedElements,
}

impl CanvasRedrawBackend {
    pub fn new(elements: SharedElements) -> Self {
        Self { elements }
    }

    fn draw(
        &self,
        page: &PageDescription,
        context: &CanvasRenderingContext2d,
        width: u32,
        height: u32,
    ) -> Result<(), JsValue> {
        let (w, h) = (width as f64, height as f64);
        context.set_fill_style_str("#ffffff");
        context.fill_rect(0.0, 0.0, w, h);

        if page.background.is_some() {
            if let Some(template) = self.elements.template() {
                context.draw_image_with_html_image_element_and_dw_and_dh(&template, 0.0, 0.0, w, h)?;
            }
        }

        let (sx, sy) = page_scale(&page.page, width, height);
        context.set_fill_style_str(INK);
        for instruction in &page.instructions {
            context.set_font(&font_for(instruction.weight, instruction.size_pt, sy));
            context.fill_text_with_max_width(
                &instruction.text,
                instruction.x_mm as f64 * sx,
                instruction.y_mm as f64 * sy,
                instruction.max_width_mm as f64 * sx,
            )?;
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl RenderBackend for CanvasRedrawBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::DomRaster
    }

    async fn probe(&self) -> Probe {
        if let Err(e) = new_canvas(1, 1) {
            return Probe::Unavailable(format!("no 2d canvas: {}", js_error(&e)));
        }
        match self.elements.template() {
            Some(template) if !template.complete() => {
                Probe::Pending("template image still loading".to_string())
            }
            Some(template) if template.natural_width() == 0 => {
                Probe::Unavailable("template image failed to load".to_string())
            }
            _ => Probe::Available,
        }
    }

    async fn reload(&self) {
        if let Some(template) = self.elements.template() {
            if !template.complete() {
                debug!("re-requesting template image");
                template.set_src(&template.src());
            }
        }
    }

    async fn execute(
        &self,
        page: &PageDescription,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedArtifact, BackendError> {
        let size = ctx
            .target_size
            .ok_or_else(|| BackendError::Execution("no measured target".to_string()))?;
        let (width, height) = canvas_size(size, ctx.params.scale);

        let (canvas, context) =
            new_canvas(width, height).map_err(|e| BackendError::Execution(js_error(&e)))?;
        self.draw(page, &context, width, height)
            .map_err(|e| BackendError::Execution(js_error(&e)))?;
        debug!(width, height, "page redrawn onto canvas");

        export_canvas(&canvas, ctx.params.raster_format, ctx.params.quality, BACKEND_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_size_applies_device_scale() {
        let sheet = TargetSize::new(794.0, 1123.0);
        assert_eq!(canvas_size(sheet, 2.0), (1588, 2246));
        assert_eq!(canvas_size(sheet, 1.0), (794, 1123));
        assert_eq!(canvas_size(TargetSize::new(0.2, 0.2), 1.0), (1, 1));
    }

    #[test]
    fn test_page_scale_keeps_axes_apart() {
        let a4 = PageSize::default();
        let (sx, sy) = page_scale(&a4, 1588, 2246);
        assert!((sx - sy).abs() < 0.01);

        // A squat preview sheet: the last baseline still lands on the canvas
        let (sx, sy) = page_scale(&a4, 800, 600);
        assert!((sx - 800.0 / 210.0).abs() < 1e-9);
        assert!((a4.max_baseline_mm() as f64 * sy) < 600.0);
        assert!(sy < sx);
    }

    #[test]
    fn test_font_size_follows_canvas_resolution() {
        // 72pt is one inch, 25.4mm
        assert_eq!(font_for(Weight::Bold, 72.0, 10.0), "bold 254.00px Helvetica, Arial, sans-serif");
        assert!(font_for(Weight::Normal, 10.0, 3.78).starts_with("normal 13.3"));
    }

    #[test]
    fn test_export_format() {
        assert_eq!(
            export_format(RasterFormat::Jpeg, 0.9),
            (ArtifactKind::Jpeg, "image/jpeg", 0.9f32 as f64)
        );
        assert_eq!(export_format(RasterFormat::Png, 0.9).1, "image/png");
    }
}
