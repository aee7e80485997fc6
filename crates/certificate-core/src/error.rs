use thiserror::Error;

use crate::field::Field;

/// Startup configuration failures. These are fatal: the tool refuses to run
/// with a layout or settings file that fails validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Layout has no entry for field '{0}'")]
    MissingLayoutEntry(Field),

    #[error("Layout lists field '{0}' more than once")]
    DuplicateLayoutEntry(Field),

    #[error("Field '{field}' is placed outside the page: {reason}")]
    OutOfBounds { field: Field, reason: String },

    #[error("Field '{field}' breaks the two-tier type policy: {reason}")]
    TierPolicy { field: Field, reason: String },

    #[error("Invalid page size: {0}")]
    InvalidPage(String),

    #[error("Invalid render settings: {0}")]
    InvalidRender(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("Required field '{0}' is empty")]
    MissingRequiredField(Field),

    #[error("Unsupported template image: {0}")]
    InvalidTemplate(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("Failed to parse client directory: {0}")]
    ParseError(String),

    #[error("Client directory has no client list")]
    MissingClientList,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("Phone number '{0}' contains no digits")]
    InvalidPhone(String),
}
