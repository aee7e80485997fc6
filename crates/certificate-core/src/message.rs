//! Hand-off text: share messages, messaging deep links, file names and the
//! plain-text backup certificate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::{format_long_date, DateLocale};
use crate::error::LinkError;
use crate::field::{CasePolicy, Field};
use crate::metrics::fold_accent;
use crate::record::CertificateRecord;

/// Who a finished certificate is sent to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub company: Option<String>,
}

/// Placeholder for a message part the operator left blank
pub fn not_specified(locale: DateLocale) -> &'static str {
    match locale {
        DateLocale::Es => "No especificado",
        DateLocale::En => "Not specified",
    }
}

/// Appended to deep-link messages, which cannot carry the file itself
pub fn manual_attach_note(locale: DateLocale) -> &'static str {
    match locale {
        DateLocale::Es => "📎 *Adjunta manualmente la imagen del certificado desde tu galería*",
        DateLocale::En => "📎 *Attach the certificate file manually from your gallery*",
    }
}

/// Greeting sent alongside the certificate. Never empty: blank parts
/// become an explicit "not specified".
pub fn share_message(
    record: &CertificateRecord,
    recipient: Option<&ContactInfo>,
    lab_name: &str,
    locale: DateLocale,
) -> String {
    let missing = not_specified(locale);
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    let name = recipient
        .and_then(|r| non_empty(&r.name))
        .or_else(|| record.get(Field::Client).map(str::to_string))
        .unwrap_or_else(|| missing.to_string());
    let material = record.get(Field::Material).unwrap_or(missing);
    let company = recipient
        .and_then(|r| r.company.as_deref())
        .and_then(non_empty)
        .unwrap_or_else(|| missing.to_string());
    let date = record
        .get(Field::IssueDate)
        .map(|d| format_long_date(d, locale))
        .unwrap_or_else(|| missing.to_string());

    match locale {
        DateLocale::Es => format!(
            "Hola {}! 👋\n\n📋 Certificado de análisis:\n🔧 Material: {}\n🏢 Empresa: {}\n📅 Fecha: {}\n\n¡Saludos desde {}! 🔬",
            name, material, company, date, lab_name
        ),
        DateLocale::En => format!(
            "Hello {}! 👋\n\n📋 Analysis certificate:\n🔧 Material: {}\n🏢 Company: {}\n📅 Date: {}\n\nBest regards from {}! 🔬",
            name, material, company, date, lab_name
        ),
    }
}

/// Digits-only phone number with the country prefix applied.
///
/// A leading `+` marks a number that already carries its country code.
pub fn normalize_phone(input: &str, country_prefix: &str) -> Result<String, LinkError> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(LinkError::InvalidPhone(input.to_string()));
    }
    let prefix: String = country_prefix
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    if input.trim_start().starts_with('+') || digits.starts_with(&prefix) {
        Ok(digits)
    } else {
        Ok(format!("{}{}", prefix, digits))
    }
}

/// `<base>/<phone>?text=<percent-encoded message>`
pub fn deep_link(base_url: &str, phone: &str, message: &str) -> String {
    format!(
        "{}/{}?text={}",
        base_url.trim_end_matches('/'),
        phone,
        urlencoding::encode(message)
    )
}

/// `certificado_<client>_<YYYY-MM-DD>.<ext>`
pub fn artifact_filename(client: Option<&str>, date: NaiveDate, extension: &str) -> String {
    let name = client
        .map(|c| {
            c.split_whitespace()
                .map(|word| {
                    word.chars()
                        .map(fold_accent)
                        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
                        .collect::<String>()
                })
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
                .join("_")
        })
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "cliente".to_string());

    format!("certificado_{}_{}.{}", name, date.format("%Y-%m-%d"), extension)
}

/// Suggested reference code: client initials, material stem, date and a
/// three-digit suffix, e.g. `FL-POL-20250920-042`.
pub fn suggest_reference(client: &str, material: &str, date: NaiveDate, nonce: u32) -> String {
    let initials: String = client
        .split_whitespace()
        .filter_map(|w| w.chars().next())
        .map(|c| fold_accent(c).to_ascii_uppercase())
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let stem: String = material
        .chars()
        .map(fold_accent)
        .filter(char::is_ascii_alphabetic)
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();

    format!(
        "{}-{}-{}-{:03}",
        if initials.is_empty() { "X" } else { initials.as_str() },
        if stem.is_empty() { "MAT" } else { stem.as_str() },
        date.format("%Y%m%d"),
        nonce % 1000
    )
}

fn label(field: Field, locale: DateLocale) -> &'static str {
    match locale {
        DateLocale::Es => field.label(),
        DateLocale::En => match field {
            Field::Client => "Client",
            Field::Reference => "Reference",
            Field::AnalysisRequest => "Analysis request",
            Field::Material => "Material",
            Field::MaterialCode => "Code",
            Field::SampleCondition => "Sample condition",
            Field::ReceiptDate => "Received",
            Field::MoisturePercent => "Moisture (%)",
            Field::LabNumber => "Lab number",
            Field::Description => "Description",
            Field::MeshPlusResult => "Mesh +150",
            Field::MeshMinusResult => "Mesh -150",
            Field::GramsPerTonneResult => "Au (g/t)",
            Field::OuncesPerTonResult => "Au (oz/t)",
            Field::IssueDate => "Issued",
            Field::Observations => "Observations",
        },
    }
}

/// Plain-text rendition of a certificate, offered when no backend could
/// produce a file.
pub fn plain_text_certificate(
    record: &CertificateRecord,
    lab_name: &str,
    locale: DateLocale,
) -> String {
    let title = match locale {
        DateLocale::Es => "CERTIFICADO DE ANÁLISIS",
        DateLocale::En => "ANALYSIS CERTIFICATE",
    };
    let blank = match locale {
        DateLocale::Es => "Sin especificar",
        DateLocale::En => "Not specified",
    };

    let mut out = format!("{}\n{}\n{}\n\n", title, lab_name, "=".repeat(title.chars().count()));
    for field in Field::ALL {
        let value = match record.get(field) {
            Some(v) if field.is_date() => format_long_date(v, locale),
            Some(v) if field.case_policy() == CasePolicy::Upper => v.to_uppercase(),
            Some(v) => v.to_string(),
            None => blank.to_string(),
        };
        out.push_str(&format!("{}: {}\n", label(field, locale), value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 20).unwrap()
    }

    #[test]
    fn test_phone_prefix_applied_when_absent() {
        assert_eq!(normalize_phone("983 832 001", "51").unwrap(), "51983832001");
    }

    #[test]
    fn test_phone_with_prefix_unchanged() {
        assert_eq!(normalize_phone("51983832001", "51").unwrap(), "51983832001");
        assert_eq!(normalize_phone("+51 983-832-001", "51").unwrap(), "51983832001");
        assert_eq!(normalize_phone("+1 555 0100", "51").unwrap(), "15550100");
    }

    #[test]
    fn test_phone_without_digits_rejected() {
        assert_eq!(
            normalize_phone("n/a", "51"),
            Err(LinkError::InvalidPhone("n/a".to_string()))
        );
    }

    #[test]
    fn test_deep_link_encoding() {
        let link = deep_link("https://wa.me/", "51983832001", "Hola Ana!\nÓxido & más");
        assert_eq!(
            link,
            "https://wa.me/51983832001?text=Hola%20Ana%21%0A%C3%93xido%20%26%20m%C3%A1s"
        );
    }

    #[test]
    fn test_share_message_fills_placeholders() {
        let record = CertificateRecord::new().with(Field::Material, "Cuarzo");
        let message = share_message(&record, None, "LabMetal", DateLocale::Es);
        assert!(message.starts_with("Hola No especificado! 👋"));
        assert!(message.contains("🔧 Material: Cuarzo"));
        assert!(message.contains("🏢 Empresa: No especificado"));
        assert!(message.contains("📅 Fecha: No especificado"));
        assert!(message.ends_with("¡Saludos desde LabMetal! 🔬"));
    }

    #[test]
    fn test_share_message_prefers_recipient() {
        let record = CertificateRecord::sample();
        let contact = ContactInfo {
            name: "Fernando".to_string(),
            phone: "983832001".to_string(),
            company: Some("Minera Sur".to_string()),
        };
        let message = share_message(&record, Some(&contact), "LabMetal", DateLocale::En);
        assert!(message.starts_with("Hello Fernando!"));
        assert!(message.contains("Company: Minera Sur"));
        assert!(message.contains("Date: Saturday, September 20, 2025"));
    }

    #[test]
    fn test_artifact_filename() {
        assert_eq!(
            artifact_filename(Some("Fernando  Loyola Núñez"), date(), "png"),
            "certificado_Fernando_Loyola_Nunez_2025-09-20.png"
        );
        assert_eq!(
            artifact_filename(None, date(), "pdf"),
            "certificado_cliente_2025-09-20.pdf"
        );
    }

    #[test]
    fn test_suggest_reference() {
        assert_eq!(
            suggest_reference("Fernando Loyola", "Polveado Óxido", date(), 42),
            "FL-POL-20250920-042"
        );
        assert_eq!(suggest_reference("", "", date(), 1234), "X-MAT-20250920-234");
    }

    #[test]
    fn test_plain_text_lists_every_field() {
        let text = plain_text_certificate(&CertificateRecord::sample(), "LabMetal", DateLocale::Es);
        assert!(text.starts_with("CERTIFICADO DE ANÁLISIS\nLabMetal\n"));
        assert!(text.contains("Cliente: FERNANDO LOYOLA"));
        assert!(text.contains("Fecha de emisión: sábado, 20 de septiembre de 2025"));
        assert!(text.contains("Observaciones: Sin especificar"));
        assert_eq!(text.lines().filter(|l| l.contains(": ")).count(), 16);
    }
}
