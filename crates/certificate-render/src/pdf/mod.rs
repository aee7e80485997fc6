//! Vector backend: draws the page with lopdf.
//!
//! Text uses the standard Type1 Helvetica pair so no font program is
//! embedded. The template, when present, becomes a full-page JPEG XObject
//! painted underneath the text.

pub mod encoding;
pub mod parse;

use async_trait::async_trait;
use certificate_core::{PageDescription, TemplateImage, Weight};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::artifact::{ArtifactKind, RenderedArtifact};
use crate::backend::{BackendKind, Probe, RenderBackend, RenderContext};
use crate::error::BackendError;
use crate::raster::{decode_template, encode_jpeg, pt_per_mm};

pub use parse::{parse_placed_text, PlacedText};

pub const BACKEND_NAME: &str = "vector-pdf";

pub(crate) const REGULAR_FONT: &[u8] = b"F1";
pub(crate) const BOLD_FONT: &[u8] = b"F2";
const BACKGROUND: &[u8] = b"Bg";

#[derive(Debug, Default, Clone, Copy)]
pub struct VectorPdfBackend;

impl VectorPdfBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl RenderBackend for VectorPdfBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    async fn probe(&self) -> Probe {
        Probe::Available
    }

    async fn execute(
        &self,
        page: &PageDescription,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedArtifact, BackendError> {
        let bytes = build_pdf(page, ctx.params.jpeg_quality())?;
        Ok(RenderedArtifact::new(ArtifactKind::Pdf, bytes, BACKEND_NAME))
    }
}

fn real(value: f32) -> Object {
    Object::Real(value)
}

fn font_dictionary(base_font: &[u8]) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(base_font.to_vec())),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
    ])
}

fn background_object(
    doc: &mut Document,
    template: &TemplateImage,
    quality: u8,
) -> Result<ObjectId, BackendError> {
    // Re-encode so the XObject is always 8-bit DeviceRGB
    let pixels = decode_template(template)?;
    let jpeg = encode_jpeg(&pixels, quality)?;
    let dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(pixels.width() as i64)),
        ("Height", Object::Integer(pixels.height() as i64)),
        ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(b"DCTDecode".to_vec())),
    ]);
    Ok(doc.add_object(Stream::new(dict, jpeg).with_compression(false)))
}

fn page_operations(page: &PageDescription, with_background: bool) -> Vec<Operation> {
    let scale = pt_per_mm();
    let width_pt = page.page.width_mm * scale;
    let height_pt = page.page.height_mm * scale;
    let mut ops = Vec::new();

    if with_background {
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                real(width_pt),
                real(0.0),
                real(0.0),
                real(height_pt),
                real(0.0),
                real(0.0),
            ],
        ));
        ops.push(Operation::new(
            "Do",
            vec![Object::Name(BACKGROUND.to_vec())],
        ));
        ops.push(Operation::new("Q", vec![]));
    }

    for instruction in &page.instructions {
        let font = match instruction.weight {
            Weight::Normal => REGULAR_FONT,
            Weight::Bold => BOLD_FONT,
        };
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(font.to_vec()), real(instruction.size_pt)],
        ));
        ops.push(Operation::new(
            "Td",
            vec![
                real(instruction.x_mm * scale),
                real(height_pt - instruction.y_mm * scale),
            ],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(
                encoding::encode(&instruction.text),
                StringFormat::Literal,
            )],
        ));
        ops.push(Operation::new("ET", vec![]));
    }
    ops
}

/// Build a one-page PDF from a page description
pub fn build_pdf(page: &PageDescription, jpeg_quality: u8) -> Result<Vec<u8>, BackendError> {
    let scale = pt_per_mm();
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let background_id = match &page.background {
        Some(template) => Some(background_object(&mut doc, template, jpeg_quality)?),
        None => None,
    };

    let content = Content {
        operations: page_operations(page, background_id.is_some()),
    };
    let encoded = content
        .encode()
        .map_err(|e| BackendError::Encoding(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    let fonts = Dictionary::from_iter(vec![
        (REGULAR_FONT.to_vec(), Object::Dictionary(font_dictionary(b"Helvetica"))),
        (BOLD_FONT.to_vec(), Object::Dictionary(font_dictionary(b"Helvetica-Bold"))),
    ]);
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    if let Some(id) = background_id {
        resources.set(
            "XObject",
            Object::Dictionary(Dictionary::from_iter(vec![(
                BACKGROUND.to_vec(),
                Object::Reference(id),
            )])),
        );
    }

    let page_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                real(page.page.width_mm * scale),
                real(page.page.height_mm * scale),
            ]),
        ),
        ("Resources", Object::Dictionary(resources)),
        ("Contents", Object::Reference(content_id)),
    ]);
    let page_id = doc.add_object(page_dict);

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(vec![Object::Reference(page_id)])),
        ("Count", Object::Integer(1)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| BackendError::Encoding(format!("Failed to write PDF: {}", e)))?;

    debug!(
        instructions = page.instructions.len(),
        background = background_id.is_some(),
        bytes = buffer.len(),
        "Built vector page"
    );
    Ok(buffer)
}
