//! `dom-snapshot`: serializes the preview sheet into an SVG
//! `foreignObject`, loads that as an image and rasterizes it.

use async_trait::async_trait;
use certificate_core::PageDescription;
use certificate_render::{
    BackendError, BackendKind, Probe, RenderBackend, RenderContext, RenderedArtifact,
};
use tracing::debug;
use web_sys::XmlSerializer;

use crate::canvas::{canvas_size, export_canvas, new_canvas};
use crate::dom::{js_error, load_image, SharedElements};

pub const BACKEND_NAME: &str = "dom-snapshot";

/// Wrap serialized XHTML in an SVG document of the given CSS size
pub fn svg_document(markup: &str, width: f64, height: f64) -> String {
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            r#"<foreignObject x="0" y="0" width="100%" height="100%">{markup}</foreignObject>"#,
            "</svg>"
        ),
        w = width.round(),
        h = height.round(),
        markup = markup
    )
}

pub fn svg_data_url(svg: &str) -> String {
    format!("data:image/svg+xml;charset=utf-8,{}", urlencoding::encode(svg))
}

pub struct SvgSnapshotBackend {
    elements: SharedElements,
}

impl SvgSnapshotBackend {
    pub fn new(elements: SharedElements) -> Self {
        Self { elements }
    }
}

#[async_trait(?Send)]
impl RenderBackend for SvgSnapshotBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::DomRaster
    }

    async fn probe(&self) -> Probe {
        match XmlSerializer::new() {
            Ok(_) => Probe::Available,
            Err(e) => Probe::Unavailable(format!("no XMLSerializer: {}", js_error(&e))),
        }
    }

    async fn execute(
        &self,
        _page: &PageDescription,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedArtifact, BackendError> {
        let size = ctx
            .target_size
            .ok_or_else(|| BackendError::Execution("no measured target".to_string()))?;
        let element = self
            .elements
            .target()
            .ok_or_else(|| BackendError::Execution("target element not attached".to_string()))?;

        let serializer = XmlSerializer::new().map_err(|e| BackendError::Execution(js_error(&e)))?;
        let markup = serializer
            .serialize_to_string(&element)
            .map_err(|e| BackendError::Execution(js_error(&e)))?;
        let svg = svg_document(&markup, size.width, size.height);

        let image = load_image(&svg_data_url(&svg))
            .await
            .map_err(|e| BackendError::Execution(format!("snapshot did not load: {}", js_error(&e))))?;

        let (width, height) = canvas_size(size, ctx.params.scale);
        let (canvas, context) =
            new_canvas(width, height).map_err(|e| BackendError::Execution(js_error(&e)))?;
        context.set_fill_style_str("#ffffff");
        context.fill_rect(0.0, 0.0, width as f64, height as f64);
        context
            .draw_image_with_html_image_element_and_dw_and_dh(
                &image,
                0.0,
                0.0,
                width as f64,
                height as f64,
            )
            .map_err(|e| BackendError::Execution(js_error(&e)))?;
        debug!(width, height, markup = markup.len(), "snapshot rasterized");

        export_canvas(&canvas, ctx.params.raster_format, ctx.params.quality, BACKEND_NAME)
    }
}
