//! In-memory files for one template compilation
//!
//! Holds the page source and the certificate background; nothing is ever
//! read from disk.

use std::collections::HashMap;
use std::path::Path;

use typst::foundations::Bytes;
use typst::syntax::{FileId, Source, VirtualPath};

use super::TemplateError;

pub const MAIN_PATH: &str = "/main.typ";

#[derive(Debug)]
pub struct VirtualFilesystem {
    files: HashMap<FileId, Bytes>,
    main_id: FileId,
}

impl VirtualFilesystem {
    /// A filesystem whose entry point holds `source`
    pub fn new(source: &str) -> Self {
        let main_id = file_id(MAIN_PATH);
        let mut files = HashMap::new();
        files.insert(main_id, Bytes::from(source.as_bytes().to_vec()));
        Self { files, main_id }
    }

    pub fn main_id(&self) -> FileId {
        self.main_id
    }

    /// Mount an asset such as the background image
    pub fn mount_file(&mut self, path: &str, content: Bytes) -> Result<FileId, TemplateError> {
        validate_path(path)?;
        let id = file_id(&normalize_path(path));
        self.files.insert(id, content);
        Ok(id)
    }

    pub fn get_source(&self, id: FileId) -> Option<Source> {
        let bytes = self.files.get(&id)?;
        let text = std::str::from_utf8(bytes).ok()?;
        Some(Source::new(id, text.to_string()))
    }

    pub fn get_file(&self, id: FileId) -> Option<&Bytes> {
        self.files.get(&id)
    }
}

fn file_id(path: &str) -> FileId {
    FileId::new(None, VirtualPath::new(path))
}

fn validate_path(path: &str) -> Result<(), TemplateError> {
    if path.contains("..") {
        return Err(TemplateError::PathSecurityViolation(
            "Path traversal with '..' is not allowed".to_string(),
        ));
    }
    if Path::new(path).is_absolute() && !path.starts_with('/') {
        return Err(TemplateError::PathSecurityViolation(
            "Absolute filesystem paths are not allowed".to_string(),
        ));
    }
    Ok(())
}

fn normalize_path(path: &str) -> String {
    let mut normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    normalized
}
