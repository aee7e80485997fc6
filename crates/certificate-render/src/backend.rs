//! Backend and render-target interfaces.

use std::time::Duration;

use async_trait::async_trait;
use certificate_core::{DeviceClass, PageDescription, RasterFormat, RenderConfig};
use serde::Serialize;

use crate::artifact::RenderedArtifact;
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Draws text onto a vector page
    Vector,
    /// Rasterizes a live DOM element
    DomRaster,
    /// Rasterizes a template-engine rendition of the page
    TemplateRaster,
    /// Minimal canvas that needs nothing from the host
    Synthetic,
}

impl BackendKind {
    /// Backends that capture a measured on-screen element
    pub fn needs_target(&self) -> bool {
        matches!(self, BackendKind::DomRaster)
    }
}

/// Capability probe result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Available,
    /// Missing for good on this host
    Unavailable(String),
    /// Still loading; worth probing again after a wait
    Pending(String),
}

/// Laid-out size of a render target, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetSize {
    pub width: f64,
    pub height: f64,
}

impl TargetSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// The on-screen element a DOM backend captures
pub trait RenderTarget {
    fn describe(&self) -> String;

    /// `None` when the element does not exist
    fn measure(&self) -> Option<TargetSize>;

    /// Force the element into layout. Returns false if it could not be touched.
    fn force_visible(&self) -> bool;
}

/// Device-adjusted knobs for one attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendParams {
    pub scale: f32,
    pub quality: f32,
    pub timeout: Duration,
    pub raster_format: RasterFormat,
}

impl BackendParams {
    pub fn resolve(config: &RenderConfig, backend: &str, device: DeviceClass) -> Self {
        let profile = config.profile(device);
        Self {
            scale: profile.scale,
            quality: profile.quality,
            timeout: config.timeout_for(backend, device),
            raster_format: config.raster_format,
        }
    }

    /// Quality mapped to the 1..=100 scale of JPEG encoders
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl Default for BackendParams {
    fn default() -> Self {
        Self::resolve(&RenderConfig::default(), "", DeviceClass::Desktop)
    }
}

/// Everything a backend may look at besides the page itself
pub struct RenderContext<'a> {
    pub params: BackendParams,
    pub device: DeviceClass,
    pub target: Option<&'a dyn RenderTarget>,
    /// Verified non-zero size, for backends that capture a target
    pub target_size: Option<TargetSize>,
}

impl<'a> RenderContext<'a> {
    pub fn detached(params: BackendParams) -> Self {
        Self {
            params,
            device: DeviceClass::Desktop,
            target: None,
            target_size: None,
        }
    }
}

/// One rendering strategy
#[async_trait(?Send)]
pub trait RenderBackend {
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    async fn probe(&self) -> Probe;

    /// Nudge a pending dependency between probes
    async fn reload(&self) {}

    async fn execute(
        &self,
        page: &PageDescription,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedArtifact, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_follow_device_profile() {
        let config = RenderConfig::default();
        let desktop = BackendParams::resolve(&config, "dom-canvas", DeviceClass::Desktop);
        let phone = BackendParams::resolve(&config, "dom-canvas", DeviceClass::Constrained);
        assert_eq!(desktop.scale, 2.0);
        assert_eq!(phone.scale, 1.0);
        assert_eq!(phone.jpeg_quality(), 90);
        assert_eq!(desktop.timeout, Duration::from_millis(15_000));
    }

    #[test]
    fn test_zero_size_detection() {
        assert!(TargetSize::new(0.0, 100.0).is_zero());
        assert!(TargetSize::default().is_zero());
        assert!(!TargetSize::new(794.0, 1123.0).is_zero());
    }
}
