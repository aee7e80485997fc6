//! The closed set of certificate fields and their static rendering policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named slot on the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Field {
    Client,
    Reference,
    AnalysisRequest,
    Material,
    MaterialCode,
    SampleCondition,
    ReceiptDate,
    MoisturePercent,
    LabNumber,
    Description,
    MeshPlusResult,
    MeshMinusResult,
    GramsPerTonneResult,
    OuncesPerTonResult,
    IssueDate,
    Observations,
}

/// How operator input is cased before placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePolicy {
    Upper,
    Preserve,
}

/// The two-tier type policy: assay results stand out from everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleTier {
    Descriptive,
    Result,
}

/// Font weight of a placed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    #[default]
    Normal,
    Bold,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::Client,
        Field::Reference,
        Field::AnalysisRequest,
        Field::Material,
        Field::MaterialCode,
        Field::SampleCondition,
        Field::ReceiptDate,
        Field::MoisturePercent,
        Field::LabNumber,
        Field::Description,
        Field::MeshPlusResult,
        Field::MeshMinusResult,
        Field::GramsPerTonneResult,
        Field::OuncesPerTonResult,
        Field::IssueDate,
        Field::Observations,
    ];

    /// Stable kebab-case name, identical to the serde representation
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Client => "client",
            Field::Reference => "reference",
            Field::AnalysisRequest => "analysis-request",
            Field::Material => "material",
            Field::MaterialCode => "material-code",
            Field::SampleCondition => "sample-condition",
            Field::ReceiptDate => "receipt-date",
            Field::MoisturePercent => "moisture-percent",
            Field::LabNumber => "lab-number",
            Field::Description => "description",
            Field::MeshPlusResult => "mesh-plus-result",
            Field::MeshMinusResult => "mesh-minus-result",
            Field::GramsPerTonneResult => "grams-per-tonne-result",
            Field::OuncesPerTonResult => "ounces-per-ton-result",
            Field::IssueDate => "issue-date",
            Field::Observations => "observations",
        }
    }

    /// Name of the matching input on the operator form
    pub fn form_name(self) -> &'static str {
        match self {
            Field::Client => "cliente",
            Field::Reference => "referencia",
            Field::AnalysisRequest => "solicitud",
            Field::Material => "material",
            Field::MaterialCode => "codigo",
            Field::SampleCondition => "condiciones",
            Field::ReceiptDate => "fechaRecepcion",
            Field::MoisturePercent => "humedad",
            Field::LabNumber => "numeroLab",
            Field::Description => "descripcion",
            Field::MeshPlusResult => "resultadoMalla150Mas",
            Field::MeshMinusResult => "resultadoMalla150Menos",
            Field::GramsPerTonneResult => "resultadoGrTm",
            Field::OuncesPerTonResult => "resultadoOzTc",
            Field::IssueDate => "fechaFinal",
            Field::Observations => "observaciones",
        }
    }

    /// Resolve either the kebab-case name or the form input name
    pub fn from_any_name(name: &str) -> Option<Field> {
        let name = name.trim();
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == name || f.form_name().eq_ignore_ascii_case(name))
            .or(match name {
                "solicitudAnalisis" => Some(Field::AnalysisRequest),
                "codigoTabla" => Some(Field::LabNumber),
                "descripcionTabla" => Some(Field::Description),
                _ => None,
            })
    }

    pub fn is_required(self) -> bool {
        matches!(self, Field::Client | Field::Material)
    }

    pub fn case_policy(self) -> CasePolicy {
        match self {
            Field::Client | Field::Reference | Field::MaterialCode | Field::LabNumber => {
                CasePolicy::Upper
            }
            _ => CasePolicy::Preserve,
        }
    }

    pub fn tier(self) -> StyleTier {
        match self {
            Field::MeshPlusResult
            | Field::MeshMinusResult
            | Field::GramsPerTonneResult
            | Field::OuncesPerTonResult => StyleTier::Result,
            _ => StyleTier::Descriptive,
        }
    }

    pub fn is_date(self) -> bool {
        matches!(self, Field::ReceiptDate | Field::IssueDate)
    }

    /// Free-text fields that are word-wrapped into their layout box
    pub fn wraps(self) -> bool {
        matches!(self, Field::Observations | Field::SampleCondition)
    }

    /// Human label used by the plain-text certificate
    pub fn label(self) -> &'static str {
        match self {
            Field::Client => "Cliente",
            Field::Reference => "Referencia",
            Field::AnalysisRequest => "Solicitud de análisis",
            Field::Material => "Material",
            Field::MaterialCode => "Código",
            Field::SampleCondition => "Condiciones",
            Field::ReceiptDate => "Fecha de recepción",
            Field::MoisturePercent => "Humedad (%)",
            Field::LabNumber => "N° de laboratorio",
            Field::Description => "Descripción",
            Field::MeshPlusResult => "Malla +150",
            Field::MeshMinusResult => "Malla -150",
            Field::GramsPerTonneResult => "Au (g/t)",
            Field::OuncesPerTonResult => "Au (oz/t)",
            Field::IssueDate => "Fecha de emisión",
            Field::Observations => "Observaciones",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::from_any_name(s).ok_or_else(|| format!("Unknown field: {}", s))
    }
}
