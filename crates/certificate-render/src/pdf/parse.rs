//! Read back the text runs of a PDF page.
//!
//! Only understands the operators the vector backend writes (`Tf`, `Td`,
//! `Tm`, `Tj`, `TJ` inside `BT`/`ET`), which is enough to inspect and
//! verify our own output.

use certificate_core::Weight;
use lopdf::content::Content;
use lopdf::{Document, Object};
use serde::Serialize;

use super::encoding;
use super::BOLD_FONT;
use crate::error::BackendError;
use crate::raster::pt_per_mm;

/// A text run with its origin converted back to top-left millimetres
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedText {
    pub page: u32,
    pub text: String,
    pub x_mm: f32,
    pub y_mm: f32,
    pub font: String,
    pub size_pt: f32,
}

impl PlacedText {
    pub fn weight(&self) -> Weight {
        if self.font.as_bytes() == BOLD_FONT {
            Weight::Bold
        } else {
            Weight::Normal
        }
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn page_height_pt(doc: &Document, page_id: lopdf::ObjectId) -> f32 {
    let media_box = doc
        .get_object(page_id)
        .ok()
        .and_then(|o| match o {
            Object::Dictionary(d) => d.get(b"MediaBox").ok(),
            _ => None,
        })
        .and_then(|o| match o {
            Object::Array(values) if values.len() == 4 => number(&values[3]),
            _ => None,
        });
    media_box.unwrap_or(297.0 * pt_per_mm())
}

fn string_bytes(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::String(bytes, _) => Some(bytes),
        _ => None,
    }
}

/// Every text run on every page, in content-stream order
pub fn parse_placed_text(pdf: &[u8]) -> Result<Vec<PlacedText>, BackendError> {
    let doc = Document::load_mem(pdf)
        .map_err(|e| BackendError::Execution(format!("Failed to parse PDF: {}", e)))?;
    let scale = pt_per_mm();
    let mut placed = Vec::new();

    for (page_number, page_id) in doc.get_pages() {
        let height_pt = page_height_pt(&doc, page_id);
        let raw = doc
            .get_page_content(page_id)
            .map_err(|e| BackendError::Execution(format!("Failed to read page content: {}", e)))?;
        let content = Content::decode(&raw)
            .map_err(|e| BackendError::Execution(format!("Failed to decode content: {}", e)))?;

        let mut font = String::new();
        let mut size_pt = 0.0_f32;
        let (mut x_pt, mut y_pt) = (0.0_f32, 0.0_f32);

        for op in &content.operations {
            match op.operator.as_str() {
                "BT" => {
                    x_pt = 0.0;
                    y_pt = 0.0;
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        font = String::from_utf8_lossy(name).into_owned();
                    }
                    size_pt = op.operands.get(1).and_then(number).unwrap_or(size_pt);
                }
                "Td" => {
                    if let (Some(dx), Some(dy)) = (
                        op.operands.first().and_then(number),
                        op.operands.get(1).and_then(number),
                    ) {
                        x_pt += dx;
                        y_pt += dy;
                    }
                }
                "Tm" => {
                    if let (Some(e), Some(f)) = (
                        op.operands.get(4).and_then(number),
                        op.operands.get(5).and_then(number),
                    ) {
                        x_pt = e;
                        y_pt = f;
                    }
                }
                "Tj" | "TJ" => {
                    let bytes: Vec<u8> = match op.operands.first() {
                        Some(Object::Array(items)) => items
                            .iter()
                            .filter_map(string_bytes)
                            .flatten()
                            .copied()
                            .collect(),
                        Some(other) => string_bytes(other).map(<[u8]>::to_vec).unwrap_or_default(),
                        None => Vec::new(),
                    };
                    placed.push(PlacedText {
                        page: page_number,
                        text: encoding::decode(&bytes),
                        x_mm: x_pt / scale,
                        y_mm: (height_pt - y_pt) / scale,
                        font: font.clone(),
                        size_pt,
                    });
                }
                _ => {}
            }
        }
    }
    Ok(placed)
}
