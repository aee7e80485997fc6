//! Certificate composition for the LabMetal assay certificate tool
//!
//! This crate holds everything that does not depend on a rendering
//! backend or a browser:
//! - the closed field set and its per-field policy (`field`)
//! - operator records (`record`) and the swappable layout table (`layout`)
//! - text measurement, wrapping and long-form dates (`metrics`, `dates`)
//! - the Document Composer (`compose`)
//! - hand-off text, the client directory and tool configuration

pub mod compose;
pub mod config;
pub mod dates;
pub mod directory;
pub mod error;
pub mod field;
pub mod layout;
pub mod message;
pub mod metrics;
pub mod record;

pub use compose::{Composer, DrawInstruction, ImageKind, PageDescription, TemplateImage};
pub use config::{DeviceClass, DeviceProfile, RasterFormat, RenderConfig, RetryPolicy, ToolConfig};
pub use dates::{format_long_date, DateLocale};
pub use directory::{ClientDirectory, ClientEntry};
pub use error::{ComposeError, ConfigError, DirectoryError, LinkError};
pub use field::{CasePolicy, Field, StyleTier, Weight};
pub use layout::{FieldLayoutEntry, LayoutTable, PageSize};
pub use message::{
    artifact_filename, deep_link, manual_attach_note, normalize_phone, plain_text_certificate,
    share_message, suggest_reference, ContactInfo,
};
pub use record::CertificateRecord;
