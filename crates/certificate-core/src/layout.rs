//! Field Layout Table
//!
//! Binds every certificate field to an absolute position and text style on
//! a fixed-size page. Tables are plain configuration: recalibrating against
//! a new template image means loading a different table, never touching the
//! composer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::field::{Field, StyleTier, Weight};
use crate::metrics::min_wrap_width_mm;

/// Physical page the layout is calibrated against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_mm: f32,
    pub height_mm: f32,
    /// Blank border no text may enter
    #[serde(default = "default_margin")]
    pub margin_mm: f32,
}

fn default_margin() -> f32 {
    5.0
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width_mm: 210.0,
        height_mm: 297.0,
        margin_mm: 5.0,
    };

    /// Lowest baseline a line may sit on
    pub fn max_baseline_mm(&self) -> f32 {
        self.height_mm - self.margin_mm
    }

    /// Rightmost x a line may reach
    pub fn max_right_mm(&self) -> f32 {
        self.width_mm - self.margin_mm
    }

    pub fn contains(&self, x_mm: f32, y_mm: f32) -> bool {
        x_mm >= self.margin_mm
            && x_mm < self.max_right_mm()
            && y_mm > self.margin_mm
            && y_mm <= self.max_baseline_mm()
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

/// Position and style of one field.
///
/// `y_mm` is the baseline of the first line, measured down from the top edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLayoutEntry {
    pub field: Field,
    pub x_mm: f32,
    pub y_mm: f32,
    #[serde(default)]
    pub weight: Weight,
    pub size_pt: f32,
    /// Box width; wrapped fields break lines inside it, others are cut to it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width_mm: Option<f32>,
    /// Optional cap on wrapped lines, to keep clear of the next field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<usize>,
    /// Literal drawn for a known-empty reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl FieldLayoutEntry {
    pub fn new(field: Field, x_mm: f32, y_mm: f32, weight: Weight, size_pt: f32) -> Self {
        Self {
            field,
            x_mm,
            y_mm,
            weight,
            size_pt,
            max_width_mm: None,
            max_lines: None,
            placeholder: None,
        }
    }

    pub fn max_width(mut self, width_mm: f32) -> Self {
        self.max_width_mm = Some(width_mm);
        self
    }

    pub fn max_lines(mut self, lines: usize) -> Self {
        self.max_lines = Some(lines);
        self
    }

    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholder = Some(text.into());
        self
    }

    /// Width available to this entry on the given page
    pub fn usable_width_mm(&self, page: &PageSize) -> f32 {
        let to_edge = page.max_right_mm() - self.x_mm;
        match self.max_width_mm {
            Some(width) => width.min(to_edge),
            None => to_edge,
        }
    }
}

/// A complete, swappable layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutTable {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub page: PageSize,
    pub entries: Vec<FieldLayoutEntry>,
}

impl LayoutTable {
    pub fn layout_for(&self, field: Field) -> Option<&FieldLayoutEntry> {
        self.entries.iter().find(|e| e.field == field)
    }

    /// Parse a layout from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let table: LayoutTable =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Startup validation. Any failure is a configuration error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let page = &self.page;
        if !(page.width_mm > 0.0 && page.height_mm > 0.0)
            || page.margin_mm < 0.0
            || 2.0 * page.margin_mm >= page.width_mm.min(page.height_mm)
        {
            return Err(ConfigError::InvalidPage(format!(
                "{}x{} mm with {} mm margin",
                page.width_mm, page.height_mm, page.margin_mm
            )));
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.field) {
                return Err(ConfigError::DuplicateLayoutEntry(entry.field));
            }
            self.validate_entry(entry)?;
        }

        if let Some(missing) = Field::ALL.into_iter().find(|f| !seen.contains(f)) {
            return Err(ConfigError::MissingLayoutEntry(missing));
        }

        self.validate_tiers()
    }

    fn validate_entry(&self, entry: &FieldLayoutEntry) -> Result<(), ConfigError> {
        let page = &self.page;
        let out_of_bounds = |reason: String| ConfigError::OutOfBounds {
            field: entry.field,
            reason,
        };

        if !(entry.size_pt > 0.0) {
            return Err(out_of_bounds(format!("font size {} pt", entry.size_pt)));
        }
        if !page.contains(entry.x_mm, entry.y_mm) {
            return Err(out_of_bounds(format!(
                "({}, {}) mm is outside the printable area",
                entry.x_mm, entry.y_mm
            )));
        }

        let min_width = min_wrap_width_mm(entry.size_pt);
        if let Some(width) = entry.max_width_mm {
            if entry.x_mm + width > page.max_right_mm() {
                return Err(out_of_bounds(format!(
                    "box of {} mm at x={} runs past the right margin",
                    width, entry.x_mm
                )));
            }
            if width < min_width {
                return Err(out_of_bounds(format!(
                    "box of {} mm is narrower than one glyph",
                    width
                )));
            }
        } else if entry.usable_width_mm(page) < min_width {
            return Err(out_of_bounds(format!(
                "x={} leaves no room before the right margin",
                entry.x_mm
            )));
        }

        if entry.max_lines == Some(0) {
            return Err(out_of_bounds("max_lines must be at least 1".to_string()));
        }

        Ok(())
    }

    fn validate_tiers(&self) -> Result<(), ConfigError> {
        let largest_descriptive = self
            .entries
            .iter()
            .filter(|e| e.field.tier() == StyleTier::Descriptive)
            .map(|e| e.size_pt)
            .fold(0.0f32, f32::max);

        for entry in self
            .entries
            .iter()
            .filter(|e| e.field.tier() == StyleTier::Result)
        {
            if entry.weight != Weight::Bold {
                return Err(ConfigError::TierPolicy {
                    field: entry.field,
                    reason: "result fields must be bold".to_string(),
                });
            }
            if entry.size_pt <= largest_descriptive {
                return Err(ConfigError::TierPolicy {
                    field: entry.field,
                    reason: format!(
                        "result size {} pt must exceed descriptive size {} pt",
                        entry.size_pt, largest_descriptive
                    ),
                });
            }
        }
        Ok(())
    }

    /// Layout calibrated against the LabMetal A4 certificate template
    pub fn labmetal_a4() -> Self {
        use Field::*;
        use Weight::*;

        let text = |field, x, y| FieldLayoutEntry::new(field, x, y, Normal, 10.0);
        let result = |field, x, y| FieldLayoutEntry::new(field, x, y, Bold, 11.0);

        Self {
            name: "labmetal-a4".to_string(),
            page: PageSize::A4,
            entries: vec![
                text(Client, 120.0, 60.0),
                text(Reference, 120.0, 75.0),
                text(AnalysisRequest, 120.0, 90.0),
                text(Material, 120.0, 120.0),
                text(MaterialCode, 120.0, 135.0),
                text(SampleCondition, 120.0, 150.0)
                    .max_width(80.0)
                    .max_lines(3),
                text(ReceiptDate, 120.0, 165.0),
                text(MoisturePercent, 120.0, 180.0).placeholder("—"),
                text(LabNumber, 50.0, 210.0).max_width(45.0),
                text(Description, 100.0, 210.0).max_width(45.0),
                result(MeshPlusResult, 150.0, 210.0).max_width(26.0),
                result(MeshMinusResult, 180.0, 210.0).max_width(25.0),
                result(GramsPerTonneResult, 150.0, 230.0).max_width(26.0),
                result(OuncesPerTonResult, 180.0, 230.0).max_width(25.0),
                FieldLayoutEntry::new(IssueDate, 120.0, 260.0, Normal, 9.0),
                FieldLayoutEntry::new(Observations, 20.0, 280.0, Normal, 8.0).max_width(150.0),
            ],
        }
    }
}

impl Default for LayoutTable {
    fn default() -> Self {
        Self::labmetal_a4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_layout_is_valid() {
        let table = LayoutTable::labmetal_a4();
        assert_eq!(table.validate(), Ok(()));
        for field in Field::ALL {
            assert!(table.layout_for(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_missing_entry_is_config_error() {
        let mut table = LayoutTable::labmetal_a4();
        table.entries.retain(|e| e.field != Field::LabNumber);
        assert_eq!(
            table.validate(),
            Err(ConfigError::MissingLayoutEntry(Field::LabNumber))
        );
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut table = LayoutTable::labmetal_a4();
        let dup = table.entries[0].clone();
        table.entries.push(dup);
        assert_eq!(
            table.validate(),
            Err(ConfigError::DuplicateLayoutEntry(Field::Client))
        );
    }

    #[test]
    fn test_out_of_page_position_rejected() {
        let mut table = LayoutTable::labmetal_a4();
        table.entries[0].y_mm = 400.0;
        assert!(matches!(
            table.validate(),
            Err(ConfigError::OutOfBounds {
                field: Field::Client,
                ..
            })
        ));
    }

    #[test]
    fn test_wrap_box_past_edge_rejected() {
        let mut table = LayoutTable::labmetal_a4();
        let obs = table
            .entries
            .iter_mut()
            .find(|e| e.field == Field::Observations)
            .unwrap();
        obs.max_width_mm = Some(195.0);
        assert!(matches!(
            table.validate(),
            Err(ConfigError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_tier_policy_enforced() {
        let mut table = LayoutTable::labmetal_a4();
        let gt = table
            .entries
            .iter_mut()
            .find(|e| e.field == Field::GramsPerTonneResult)
            .unwrap();
        gt.size_pt = 10.0;
        assert!(matches!(
            table.validate(),
            Err(ConfigError::TierPolicy { .. })
        ));

        let mut table = LayoutTable::labmetal_a4();
        table
            .entries
            .iter_mut()
            .find(|e| e.field == Field::MeshPlusResult)
            .unwrap()
            .weight = Weight::Normal;
        assert!(matches!(
            table.validate(),
            Err(ConfigError::TierPolicy { .. })
        ));
    }

    #[test]
    fn test_json_round_trip_preserves_table() {
        let table = LayoutTable::labmetal_a4();
        let json = table.to_json_pretty().unwrap();
        let parsed = LayoutTable::from_json(&json).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_json_defaults_page_and_weight() {
        let mut entries: Vec<String> = Field::ALL
            .iter()
            .map(|f| {
                let (weight, size) = if f.tier() == StyleTier::Result {
                    ("bold", 12)
                } else {
                    ("normal", 10)
                };
                format!(
                    r#"{{"field":"{}","x_mm":20,"y_mm":50,"weight":"{}","size_pt":{}}}"#,
                    f, weight, size
                )
            })
            .collect();
        entries.sort();
        let json = format!(r#"{{"entries":[{}]}}"#, entries.join(","));
        let table = LayoutTable::from_json(&json).unwrap();
        assert_eq!(table.page, PageSize::A4);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            LayoutTable::from_json("{"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
