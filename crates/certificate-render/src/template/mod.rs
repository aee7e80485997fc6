//! Template rasterizer: typesets the page with Typst and renders it to
//! pixels with typst-render.
//!
//! Native hosts register this backend where a browser would capture the
//! on-screen preview. The Typst source is fixed; the page description
//! arrives through `sys.inputs`.

pub mod fonts;
pub mod virtual_fs;
pub mod world;

use async_trait::async_trait;
use certificate_core::{ImageKind, PageDescription, RasterFormat, Weight};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};
use typst::diag::Severity;
use typst::foundations::Bytes;

use crate::artifact::{ArtifactKind, RenderedArtifact};
use crate::backend::{BackendKind, Probe, RenderBackend, RenderContext};
use crate::error::BackendError;
use crate::raster::{encode_jpeg, CSS_DPI};

use fonts::{global_font_cache, CERTIFICATE_FAMILY};
use world::CertificateWorld;

pub const BACKEND_NAME: &str = "template-raster";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Path security violation: {0}")]
    PathSecurityViolation(String),

    #[error("Invalid template input: {0}")]
    InvalidInput(String),

    #[error("Compilation failed: {0}")]
    Compile(String),

    #[error("Document has no pages")]
    NoPages,

    #[error("PNG encoding failed: {0}")]
    Encoding(String),
}

impl From<TemplateError> for BackendError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Encoding(msg) => BackendError::Encoding(msg),
            other => BackendError::Execution(other.to_string()),
        }
    }
}

const PAGE_SOURCE: &str = r##"#let inp = sys.inputs
#set page(width: inp.width_mm * 1mm, height: inp.height_mm * 1mm, margin: 0pt)
#set text(font: inp.family, fill: rgb("#141414"), top-edge: "baseline", bottom-edge: "baseline")
#if inp.at("background", default: none) != none {
  place(top + left, image(inp.background, width: 100%, height: 100%, fit: "stretch"))
}
#for run in inp.lines {
  let body = text(size: run.size * 1pt, weight: if run.bold { "bold" } else { "regular" }, run.text)
  place(top + left, dx: run.x * 1mm, dy: run.y * 1mm, context {
    let natural = measure(body).width
    let room = run.width * 1mm
    if natural > room { scale(x: room / natural * 100%, origin: left, body) } else { body }
  })
}
"##;

fn background_path(kind: ImageKind) -> &'static str {
    match kind {
        ImageKind::Png => "/background.png",
        ImageKind::Jpeg => "/background.jpg",
    }
}

/// Build the world for one page
fn page_world(page: &PageDescription) -> Result<CertificateWorld, TemplateError> {
    let lines: Vec<serde_json::Value> = page
        .instructions
        .iter()
        .map(|i| {
            json!({
                "x": i.x_mm,
                "y": i.y_mm,
                "size": i.size_pt,
                "width": i.max_width_mm,
                "bold": i.weight == Weight::Bold,
                "text": i.text,
            })
        })
        .collect();

    let mut assets = Vec::new();
    let background = page.background.as_ref().map(|template| {
        let path = background_path(template.kind);
        assets.push((path.to_string(), Bytes::from(template.bytes.clone())));
        path
    });

    let inputs = json!({
        "width_mm": page.page.width_mm,
        "height_mm": page.page.height_mm,
        "family": CERTIFICATE_FAMILY,
        "background": background,
        "lines": lines,
    });
    CertificateWorld::new(PAGE_SOURCE, &inputs, assets)
}

/// Typeset and rasterize the page to PNG bytes
pub fn render_png(page: &PageDescription, scale: f32) -> Result<Vec<u8>, TemplateError> {
    let world = page_world(page)?;
    let warned = typst::compile(&world);
    for warning in &warned.warnings {
        debug!(message = %warning.message, "template warning");
    }

    let document = warned.output.map_err(|diagnostics| {
        let messages: Vec<String> = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.message.to_string())
            .collect();
        TemplateError::Compile(messages.join("; "))
    })?;

    let first = document.pages.first().ok_or(TemplateError::NoPages)?;
    if document.pages.len() > 1 {
        warn!(pages = document.pages.len(), "template overflowed onto extra pages");
    }

    let pixels_per_point = scale * CSS_DPI / 72.0;
    let pixmap = typst_render::render(first, pixels_per_point);
    pixmap
        .encode_png()
        .map_err(|e| TemplateError::Encoding(e.to_string()))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateRasterBackend;

impl TemplateRasterBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl RenderBackend for TemplateRasterBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::TemplateRaster
    }

    async fn probe(&self) -> Probe {
        if global_font_cache().has_family(CERTIFICATE_FAMILY) {
            Probe::Available
        } else {
            Probe::Unavailable(format!("font {} is not embedded", CERTIFICATE_FAMILY))
        }
    }

    async fn execute(
        &self,
        page: &PageDescription,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedArtifact, BackendError> {
        let png = render_png(page, ctx.params.scale)?;
        let artifact = match ctx.params.raster_format {
            RasterFormat::Png => RenderedArtifact::new(ArtifactKind::Png, png, BACKEND_NAME),
            RasterFormat::Jpeg => {
                let pixels = image::load_from_memory(&png)
                    .map_err(|e| BackendError::Encoding(e.to_string()))?
                    .to_rgb8();
                let jpeg = encode_jpeg(&pixels, ctx.params.jpeg_quality())?;
                RenderedArtifact::new(ArtifactKind::Jpeg, jpeg, BACKEND_NAME)
            }
        };
        Ok(artifact)
    }
}
