//! Typst `World` backed by memory only

use chrono::{Datelike, Timelike, Utc};
use typst::diag::{FileError, FileResult};
use typst::foundations::{Array, Bytes, Datetime, Dict, Value};
use typst::syntax::{FileId, Source};
use typst::text::{Font, FontBook};
use typst::utils::LazyHash;
use typst::{Library, World};

use super::fonts::{global_font_cache, FontCache};
use super::virtual_fs::VirtualFilesystem;
use super::TemplateError;

pub struct CertificateWorld {
    filesystem: VirtualFilesystem,
    font_cache: &'static FontCache,
    time: chrono::DateTime<Utc>,
    /// Standard library with `sys.inputs` preset
    library: LazyHash<Library>,
}

impl CertificateWorld {
    pub fn new(
        source: &str,
        inputs: &serde_json::Value,
        assets: Vec<(String, Bytes)>,
    ) -> Result<Self, TemplateError> {
        let mut filesystem = VirtualFilesystem::new(source);
        for (path, content) in assets {
            filesystem.mount_file(&path, content)?;
        }

        let inputs = match json_to_typst_value(inputs)? {
            Value::Dict(dict) => dict,
            _ => {
                return Err(TemplateError::InvalidInput(
                    "inputs must be an object".to_string(),
                ))
            }
        };

        Ok(Self {
            filesystem,
            font_cache: global_font_cache(),
            time: Utc::now(),
            library: LazyHash::new(Library::builder().with_inputs(inputs).build()),
        })
    }
}

/// Convert a JSON value to a Typst value
pub fn json_to_typst_value(json: &serde_json::Value) -> Result<Value, TemplateError> {
    match json {
        serde_json::Value::Null => Ok(Value::None),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(TemplateError::InvalidInput(format!("Invalid number: {}", n)))
            }
        }
        serde_json::Value::String(s) => Ok(Value::Str(s.as_str().into())),
        serde_json::Value::Array(arr) => {
            let items = arr
                .iter()
                .map(json_to_typst_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(Array::from(items.as_slice())))
        }
        serde_json::Value::Object(obj) => {
            let mut dict = Dict::new();
            for (k, v) in obj {
                dict.insert(k.as_str().into(), json_to_typst_value(v)?);
            }
            Ok(Value::Dict(dict))
        }
    }
}

impl World for CertificateWorld {
    fn library(&self) -> &LazyHash<Library> {
        &self.library
    }

    fn book(&self) -> &LazyHash<FontBook> {
        self.font_cache.book()
    }

    fn main(&self) -> FileId {
        self.filesystem.main_id()
    }

    fn source(&self, id: FileId) -> FileResult<Source> {
        self.filesystem
            .get_source(id)
            .ok_or_else(|| FileError::NotFound(id.vpath().as_rootless_path().into()))
    }

    fn file(&self, id: FileId) -> FileResult<Bytes> {
        self.filesystem
            .get_file(id)
            .cloned()
            .ok_or_else(|| FileError::NotFound(id.vpath().as_rootless_path().into()))
    }

    fn font(&self, index: usize) -> Option<Font> {
        self.font_cache.font(index)
    }

    fn today(&self, offset: Option<i64>) -> Option<Datetime> {
        let adjusted = self.time + chrono::Duration::hours(offset.unwrap_or(0));
        Datetime::from_ymd_hms(
            adjusted.year(),
            adjusted.month() as u8,
            adjusted.day() as u8,
            adjusted.hour() as u8,
            adjusted.minute() as u8,
            adjusted.second() as u8,
        )
    }
}
