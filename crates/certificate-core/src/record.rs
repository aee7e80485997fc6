//! Operator-entered certificate values.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::field::Field;

/// One certificate's worth of operator input.
///
/// Built fresh from form state before every render and never mutated while
/// a render is running. Whitespace-only values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CertificateRecord {
    values: BTreeMap<Field, String>,
}

impl CertificateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.values.remove(&field);
        } else {
            self.values.insert(field, trimmed.to_string());
        }
    }

    /// Present, non-empty value for a field
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (Field, &str)> {
        self.values.iter().map(|(f, v)| (*f, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First required field with no value, in declaration order
    pub fn missing_required(&self) -> Option<Field> {
        Field::ALL
            .into_iter()
            .find(|f| f.is_required() && !self.contains(*f))
    }

    /// Build a record from raw form state keyed by input name.
    ///
    /// Accepts both kebab-case field names and the form's own input ids.
    pub fn from_form<K, V>(form: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut record = Self::new();
        for (key, value) in form {
            match Field::from_any_name(key.as_ref()) {
                Some(field) => record.set(field, value),
                None => debug!(key = key.as_ref(), "ignoring unknown form key"),
            }
        }
        record
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        // Accept loose maps so form dumps with extra keys still load
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;
        Ok(Self::from_form(raw.into_iter().filter_map(|(k, v)| {
            match v {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Number(n) => Some((k, n.to_string())),
                _ => None,
            }
        })))
    }

    /// The reference sample used by the preview button and the docs
    pub fn sample() -> Self {
        Self::new()
            .with(Field::Client, "FERNANDO LOYOLA")
            .with(Field::Reference, "FL-POL-20250920-001")
            .with(Field::AnalysisRequest, "Análisis de oro por ensayo al fuego")
            .with(Field::Material, "Polveado Óxido")
            .with(Field::MaterialCode, "m-001")
            .with(Field::SampleCondition, "Muestra seca, pulverizada a malla 150")
            .with(Field::ReceiptDate, "2025-09-18")
            .with(Field::MoisturePercent, "2.4")
            .with(Field::LabNumber, "lm-2025-0412")
            .with(Field::Description, "Mineral aurífero")
            .with(Field::MeshPlusResult, "0.120")
            .with(Field::MeshMinusResult, "10.215")
            .with(Field::GramsPerTonneResult, "10.335")
            .with(Field::OuncesPerTonResult, "0.301")
            .with(Field::IssueDate, "2025-09-20")
    }
}

impl<'de> Deserialize<'de> for CertificateRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = BTreeMap::<Field, String>::deserialize(deserializer)?;
        let mut record = Self::new();
        for (field, value) in values {
            record.set(field, value);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blank_values_are_absent() {
        let record = CertificateRecord::new()
            .with(Field::Client, "   ")
            .with(Field::Material, "  Cuarzo ");
        assert!(!record.contains(Field::Client));
        assert_eq!(record.get(Field::Material), Some("Cuarzo"));
        assert_eq!(record.missing_required(), Some(Field::Client));
    }

    #[test]
    fn test_from_form_accepts_both_namings() {
        let record = CertificateRecord::from_form([
            ("cliente", "Ana"),
            ("material", "Oro"),
            ("grams-per-tonne-result", "1.2"),
            ("botonEnviar", "x"),
        ]);
        assert_eq!(record.len(), 3);
        assert_eq!(record.get(Field::Client), Some("Ana"));
        assert_eq!(record.get(Field::GramsPerTonneResult), Some("1.2"));
        assert_eq!(record.missing_required(), None);
    }

    #[test]
    fn test_from_json_coerces_numbers() {
        let record =
            CertificateRecord::from_json(r#"{"client":"Ana","humedad":3.5,"flag":true}"#).unwrap();
        assert_eq!(record.get(Field::MoisturePercent), Some("3.5"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let record = CertificateRecord::new().with(Field::LabNumber, "A1");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"lab-number":"A1"}"#);
    }
}
