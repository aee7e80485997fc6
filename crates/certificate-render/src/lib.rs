//! Rendering and hand-off for LabMetal certificates
//!
//! Takes the backend-neutral [`PageDescription`](certificate_core::PageDescription)
//! from `certificate-core` and turns it into a file the operator can keep
//! and send:
//! - `selector`: ordered backend fallback with probing, retries and timeouts
//! - `pdf`, `raster`, `template`: the backends that run without a browser
//! - `export`: download, native share and deep-link hand-off
//! - `session`: the per-page state that ties it all together
//!
//! Browser-only backends live in the web app and plug in through
//! [`RenderBackend`].

pub mod artifact;
pub mod backend;
pub mod error;
pub mod export;
pub mod fallback;
pub mod pdf;
pub mod raster;
pub mod selector;
pub mod session;
#[cfg(feature = "template")]
pub mod template;
pub mod timer;

pub use artifact::{ArtifactKind, ArtifactSlot, RenderedArtifact, ResourceHandle};
pub use backend::{
    BackendKind, BackendParams, Probe, RenderBackend, RenderContext, RenderTarget, TargetSize,
};
pub use error::{BackendError, HandoffError, RenderError, ShareError};
pub use export::{
    DownloadSink, HandoffAdapter, HandoffOutcome, HandoffPath, LinkOpener, SavedArtifact,
    ShareRequest, ShareSurface,
};
pub use fallback::{manual_capture_steps, ExhaustionReport};
pub use pdf::{parse_placed_text, PlacedText, VectorPdfBackend};
pub use raster::SyntheticCanvasBackend;
pub use selector::{AttemptOutcome, AttemptRecord, CancelToken, RenderOutcome, RenderStrategySelector};
pub use session::{CaptureReport, CertificateSession, SessionError, ShareReport};
#[cfg(feature = "template")]
pub use template::{TemplateError, TemplateRasterBackend};
#[cfg(feature = "tokio-timer")]
pub use timer::TokioTimer;
pub use timer::{with_timeout, Timer};
