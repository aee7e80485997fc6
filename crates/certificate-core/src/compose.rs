//! Document Composer
//!
//! Turns a [`CertificateRecord`] into a [`PageDescription`]: a list of text
//! placements in page millimetres plus an optional background template.
//! The page description is backend-neutral; the composer never assumes a
//! browser or a PDF library exists.

use std::io::Cursor;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dates::{format_long_date, DateLocale};
use crate::error::ComposeError;
use crate::field::{CasePolicy, Field, Weight};
use crate::layout::{FieldLayoutEntry, LayoutTable, PageSize};
use crate::metrics::{fit_line, line_height_mm, wrap_text, ELLIPSIS};
use crate::record::CertificateRecord;

/// Values operators type to mean "measured, nothing to report"
const EMPTY_READING_MARKERS: [&str; 3] = ["—", "–", "-"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }
}

/// The certificate artwork the text is drawn over
#[derive(Clone, PartialEq, Eq)]
pub struct TemplateImage {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
    pub width_px: u32,
    pub height_px: u32,
}

impl std::fmt::Debug for TemplateImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateImage")
            .field("kind", &self.kind)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl TemplateImage {
    /// Sniff format and pixel size without decoding the whole image
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ComposeError> {
        let kind = match image::guess_format(&bytes) {
            Ok(image::ImageFormat::Png) => ImageKind::Png,
            Ok(image::ImageFormat::Jpeg) => ImageKind::Jpeg,
            Ok(other) => {
                return Err(ComposeError::InvalidTemplate(format!(
                    "{:?} templates are not supported",
                    other
                )))
            }
            Err(e) => return Err(ComposeError::InvalidTemplate(e.to_string())),
        };

        let (width_px, height_px) = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| ComposeError::InvalidTemplate(e.to_string()))?
            .into_dimensions()
            .map_err(|e| ComposeError::InvalidTemplate(e.to_string()))?;

        Ok(Self {
            bytes,
            kind,
            width_px,
            height_px,
        })
    }
}

/// One line of text placed on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawInstruction {
    pub field: Field,
    pub text: String,
    pub x_mm: f32,
    /// Baseline, measured down from the top edge
    pub y_mm: f32,
    pub weight: Weight,
    pub size_pt: f32,
    /// Room the line was fitted into, never past the right margin
    pub max_width_mm: f32,
}

/// A finished, backend-neutral page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageDescription {
    pub page: PageSize,
    #[serde(skip)]
    pub background: Option<Arc<TemplateImage>>,
    pub instructions: Vec<DrawInstruction>,
}

impl PageDescription {
    /// Text drawn for one field, lines joined with newlines
    pub fn text_for(&self, field: Field) -> Option<String> {
        let lines: Vec<&str> = self
            .instructions
            .iter()
            .filter(|i| i.field == field)
            .map(|i| i.text.as_str())
            .collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    pub fn fields(&self) -> Vec<Field> {
        let mut fields: Vec<Field> = self.instructions.iter().map(|i| i.field).collect();
        fields.dedup();
        fields
    }
}

/// Lays out records against one layout table
#[derive(Debug, Clone)]
pub struct Composer {
    layout: LayoutTable,
    locale: DateLocale,
}

impl Composer {
    pub fn new(layout: LayoutTable, locale: DateLocale) -> Self {
        Self { layout, locale }
    }

    pub fn layout(&self) -> &LayoutTable {
        &self.layout
    }

    pub fn locale(&self) -> DateLocale {
        self.locale
    }

    /// Compose a page for rendering.
    ///
    /// Fails only when client or material is missing; every other empty
    /// field is simply left off the page. A missing background is not an
    /// error.
    pub fn compose(
        &self,
        record: &CertificateRecord,
        background: Option<Arc<TemplateImage>>,
    ) -> Result<PageDescription, ComposeError> {
        if let Some(field) = record.missing_required() {
            return Err(ComposeError::MissingRequiredField(field));
        }
        let mut page = self.preview(record);
        page.background = background;
        Ok(page)
    }

    /// Same placement as [`Composer::compose`] without the required-field
    /// check. Drives the live on-screen preview while the form is filled.
    pub fn preview(&self, record: &CertificateRecord) -> PageDescription {
        let mut instructions = Vec::new();

        for field in Field::ALL {
            let (Some(value), Some(entry)) = (record.get(field), self.layout.layout_for(field))
            else {
                continue;
            };
            let text = self.display_text(field, value, entry);
            self.place(entry, &text, &mut instructions);
        }

        PageDescription {
            page: self.layout.page,
            background: None,
            instructions,
        }
    }

    /// The string a field shows before line breaking
    pub fn display_text(&self, field: Field, value: &str, entry: &FieldLayoutEntry) -> String {
        if let Some(placeholder) = &entry.placeholder {
            if EMPTY_READING_MARKERS.contains(&value) {
                return placeholder.clone();
            }
        }

        let text = if field.is_date() {
            format_long_date(value, self.locale)
        } else {
            value.to_string()
        };

        match field.case_policy() {
            CasePolicy::Upper => text.to_uppercase(),
            CasePolicy::Preserve => text,
        }
    }

    fn place(&self, entry: &FieldLayoutEntry, text: &str, out: &mut Vec<DrawInstruction>) {
        let page = &self.layout.page;
        let width = entry.usable_width_mm(page);
        let line_height = line_height_mm(entry.size_pt);

        let mut lines = if entry.field.wraps() {
            wrap_text(text, width, entry.weight, entry.size_pt)
        } else {
            let single = text.split_whitespace().collect::<Vec<_>>().join(" ");
            vec![fit_line(&single, width, entry.weight, entry.size_pt)]
        };

        let room = ((page.max_baseline_mm() - entry.y_mm) / line_height).floor() as usize + 1;
        let keep = entry.max_lines.unwrap_or(usize::MAX).min(room);
        if lines.len() > keep {
            debug!(
                field = %entry.field,
                lines = lines.len(),
                keep,
                "truncating wrapped text to fit the page"
            );
            lines.truncate(keep);
            if let Some(last) = lines.last_mut() {
                let marked = format!("{}{}", last.trim_end(), ELLIPSIS);
                *last = fit_line(&marked, width, entry.weight, entry.size_pt);
            }
        }

        for (i, line) in lines.into_iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            out.push(DrawInstruction {
                field: entry.field,
                text: line,
                x_mm: entry.x_mm,
                y_mm: entry.y_mm + i as f32 * line_height,
                weight: entry.weight,
                size_pt: entry.size_pt,
                max_width_mm: width,
            });
        }
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(LayoutTable::labmetal_a4(), DateLocale::Es)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::text_width_mm;
    use pretty_assertions::assert_eq;

    fn minimal() -> CertificateRecord {
        CertificateRecord::new()
            .with(Field::Client, "fernando loyola")
            .with(Field::Material, "Polveado Óxido")
    }

    #[test]
    fn test_compose_emits_only_present_fields() {
        let page = Composer::default().compose(&minimal(), None).unwrap();
        assert_eq!(page.fields(), vec![Field::Client, Field::Material]);
        assert!(page.background.is_none());
    }

    #[test]
    fn test_missing_required_field() {
        let composer = Composer::default();
        let record = CertificateRecord::new().with(Field::Client, "Ana");
        assert_eq!(
            composer.compose(&record, None),
            Err(ComposeError::MissingRequiredField(Field::Material))
        );
        let record = CertificateRecord::new().with(Field::Material, "Oro");
        assert_eq!(
            composer.compose(&record, None),
            Err(ComposeError::MissingRequiredField(Field::Client))
        );
    }

    #[test]
    fn test_case_policy_per_field() {
        let record = minimal()
            .with(Field::LabNumber, "lm-12")
            .with(Field::Description, "Mineral aurífero");
        let page = Composer::default().compose(&record, None).unwrap();
        assert_eq!(page.text_for(Field::Client).unwrap(), "FERNANDO LOYOLA");
        assert_eq!(page.text_for(Field::LabNumber).unwrap(), "LM-12");
        assert_eq!(page.text_for(Field::Description).unwrap(), "Mineral aurífero");
        assert_eq!(page.text_for(Field::Material).unwrap(), "Polveado Óxido");
    }

    #[test]
    fn test_results_use_result_tier_style() {
        let record = minimal().with(Field::GramsPerTonneResult, "10.335");
        let page = Composer::default().compose(&record, None).unwrap();
        let result = page
            .instructions
            .iter()
            .find(|i| i.field == Field::GramsPerTonneResult)
            .unwrap();
        let client = page
            .instructions
            .iter()
            .find(|i| i.field == Field::Client)
            .unwrap();
        assert_eq!(result.weight, Weight::Bold);
        assert!(result.size_pt > client.size_pt);
    }

    #[test]
    fn test_dates_render_long_form() {
        let record = minimal().with(Field::IssueDate, "2025-09-20");
        let page = Composer::default().compose(&record, None).unwrap();
        assert_eq!(
            page.text_for(Field::IssueDate).unwrap(),
            "sábado, 20 de septiembre de 2025"
        );

        let english = Composer::new(LayoutTable::labmetal_a4(), DateLocale::En);
        let page = english.compose(&record, None).unwrap();
        assert_eq!(
            page.text_for(Field::IssueDate).unwrap(),
            "Saturday, September 20, 2025"
        );
    }

    #[test]
    fn test_moisture_placeholder() {
        let record = minimal().with(Field::MoisturePercent, "-");
        let page = Composer::default().compose(&record, None).unwrap();
        assert_eq!(page.text_for(Field::MoisturePercent).unwrap(), "—");

        let record = minimal().with(Field::MoisturePercent, "3.1");
        let page = Composer::default().compose(&record, None).unwrap();
        assert_eq!(page.text_for(Field::MoisturePercent).unwrap(), "3.1");
    }

    #[test]
    fn test_long_observations_are_truncated_at_page_bottom() {
        let record = minimal().with(Field::Observations, "muestra ".repeat(600));
        let composer = Composer::default();
        let page = composer.compose(&record, None).unwrap();
        let lines: Vec<_> = page
            .instructions
            .iter()
            .filter(|i| i.field == Field::Observations)
            .collect();
        assert!(lines.len() > 1);
        assert!(lines.last().unwrap().text.ends_with(ELLIPSIS));
        for line in lines {
            assert!(line.y_mm <= page.page.max_baseline_mm());
        }
    }

    #[test]
    fn test_single_line_field_is_cut_to_box() {
        let record = minimal().with(Field::LabNumber, "X".repeat(80));
        let composer = Composer::default();
        let page = composer.compose(&record, None).unwrap();
        let entry = composer.layout().layout_for(Field::LabNumber).unwrap();
        let text = page.text_for(Field::LabNumber).unwrap();
        assert!(text.ends_with(ELLIPSIS));
        assert!(
            text_width_mm(&text, entry.weight, entry.size_pt)
                <= entry.usable_width_mm(&page.page)
        );
    }

    #[test]
    fn test_every_line_carries_its_box_inside_the_margins() {
        let record = CertificateRecord::sample()
            .with(Field::Description, "i".repeat(200))
            .with(Field::Observations, "l".repeat(600));
        let composer = Composer::default();
        let page = composer.compose(&record, None).unwrap();
        for instruction in &page.instructions {
            let entry = composer.layout().layout_for(instruction.field).unwrap();
            assert_eq!(instruction.max_width_mm, entry.usable_width_mm(&page.page));
            assert!(instruction.x_mm + instruction.max_width_mm <= page.page.max_right_mm() + 1e-3);
            assert!(
                text_width_mm(&instruction.text, instruction.weight, instruction.size_pt)
                    <= instruction.max_width_mm
            );
        }
    }

    #[test]
    fn test_sample_condition_respects_line_cap() {
        let record = minimal().with(Field::SampleCondition, "húmeda ".repeat(100));
        let page = Composer::default().compose(&record, None).unwrap();
        let count = page
            .instructions
            .iter()
            .filter(|i| i.field == Field::SampleCondition)
            .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_preview_skips_validation() {
        let record = CertificateRecord::new().with(Field::Reference, "abc");
        let page = Composer::default().preview(&record);
        assert_eq!(page.text_for(Field::Reference).unwrap(), "ABC");
    }

    #[test]
    fn test_template_image_sniffing() {
        let mut png = Vec::new();
        image::RgbImage::new(4, 3)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let template = TemplateImage::from_bytes(png).unwrap();
        assert_eq!(template.kind, ImageKind::Png);
        assert_eq!((template.width_px, template.height_px), (4, 3));

        assert!(TemplateImage::from_bytes(b"not an image".to_vec()).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::metrics::text_width_mm;
    use proptest::prelude::*;

    fn any_field() -> impl Strategy<Value = Field> {
        proptest::sample::select(Field::ALL.to_vec())
    }

    fn any_record() -> impl Strategy<Value = CertificateRecord> {
        proptest::collection::btree_map(any_field(), "[ -~áéíóúñÑ—]{0,120}", 0..16).prop_map(
            |values| {
                let mut record = CertificateRecord::new();
                for (field, value) in values {
                    record.set(field, value);
                }
                record
            },
        )
    }

    fn assert_inside(page: &PageDescription) -> Result<(), TestCaseError> {
        let layout = LayoutTable::labmetal_a4();
        for i in &page.instructions {
            let entry = layout.layout_for(i.field).unwrap();
            prop_assert!(page.page.contains(i.x_mm, i.y_mm), "{:?}", i);
            prop_assert!(
                text_width_mm(&i.text, i.weight, i.size_pt) <= entry.usable_width_mm(&page.page)
            );
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn compose_references_only_present_fields(
            record in any_record(),
            client in "[a-zA-Z ]{1,40}[a-z]",
            material in "[a-zA-Z]{1,30}",
        ) {
            let record = record.with(Field::Client, client).with(Field::Material, material);
            let page = Composer::default().compose(&record, None).unwrap();
            for i in &page.instructions {
                prop_assert!(record.contains(i.field));
            }
            assert_inside(&page)?;
        }

        #[test]
        fn missing_required_never_draws(record in any_record()) {
            let mut record = record;
            record.set(Field::Material, "");
            prop_assert_eq!(
                Composer::default().compose(&record, None),
                Err(ComposeError::MissingRequiredField(
                    record.missing_required().unwrap_or(Field::Material)
                ))
            );
        }

        #[test]
        fn observations_stay_on_page(text in "[a-zA-Z0-9 .,;áé\\n]{0,5000}") {
            let record = CertificateRecord::new()
                .with(Field::Client, "Ana")
                .with(Field::Material, "Oro")
                .with(Field::Observations, text);
            let page = Composer::default().compose(&record, None).unwrap();
            assert_inside(&page)?;
        }
    }
}
