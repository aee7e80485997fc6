use thiserror::Error;

use crate::fallback::ExhaustionReport;

/// A backend that was available but could not produce an artifact
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Drawing failed: {0}")]
    Execution(String),

    #[error("Backend produced an empty artifact")]
    EmptyArtifact,

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Image encoding failed: {0}")]
    Encoding(String),

    #[error("Canvas is tainted by a cross-origin image: {0}")]
    Tainted(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Every configured backend was skipped or failed
    #[error("All render backends exhausted: {0}")]
    AllBackendsExhausted(ExhaustionReport),

    #[error("A render is already in progress")]
    Busy,

    #[error("Render cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandoffError {
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Could not open link: {0}")]
    Link(String),
}

/// Outcome of a native share sheet that did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShareError {
    #[error("Share cancelled by the user")]
    Cancelled,

    #[error("Share rejected: {0}")]
    Rejected(String),

    #[error("Sharing is not supported here")]
    Unsupported,
}
