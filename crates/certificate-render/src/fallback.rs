//! What the operator sees when no backend could produce a file.

use std::fmt;

use certificate_core::DateLocale;
use serde::Serialize;

use crate::selector::{AttemptOutcome, AttemptRecord};

/// Which backends were tried and how each one ended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExhaustionReport {
    pub attempts: Vec<AttemptRecord>,
}

impl ExhaustionReport {
    pub fn tried(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.backend.as_str()).collect()
    }

    /// Last error or skip reason recorded for a backend
    pub fn last_error(&self, backend: &str) -> Option<&str> {
        self.attempts
            .iter()
            .rev()
            .find(|a| a.backend == backend)
            .and_then(|a| match &a.outcome {
                AttemptOutcome::Skipped { reason } => Some(reason.as_str()),
                AttemptOutcome::Failed { error } => Some(error.as_str()),
                AttemptOutcome::Succeeded => None,
            })
    }

    /// Step-by-step manual capture and attach procedure
    pub fn manual_steps(&self, locale: DateLocale) -> Vec<String> {
        manual_capture_steps(locale)
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

impl fmt::Display for ExhaustionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .attempts
            .iter()
            .map(|a| match &a.outcome {
                AttemptOutcome::Succeeded => format!("{}: succeeded", a.backend),
                AttemptOutcome::Skipped { reason } => format!("{}: skipped ({})", a.backend, reason),
                AttemptOutcome::Failed { error } => format!("{}: failed ({})", a.backend, error),
            })
            .collect();
        f.write_str(&parts.join("; "))
    }
}

pub fn manual_capture_steps(locale: DateLocale) -> &'static [&'static str] {
    match locale {
        DateLocale::Es => &[
            "Pulsa «Vista previa» y espera a que la hoja del certificado se vea completa.",
            "Toma una captura de pantalla (Windows: Win+Shift+S, Mac: Cmd+Shift+4, móvil: encendido + bajar volumen).",
            "Recorta la captura al borde de la hoja y guárdala en tu galería.",
            "Pulsa «Enviar por WhatsApp» y adjunta la captura manualmente.",
            "Si no puedes adjuntar imágenes, descarga el certificado en texto como respaldo.",
        ],
        DateLocale::En => &[
            "Press \"Preview\" and wait until the certificate sheet is fully visible.",
            "Take a screenshot (Windows: Win+Shift+S, Mac: Cmd+Shift+4, phone: power + volume down).",
            "Crop the screenshot to the sheet edges and save it to your gallery.",
            "Press \"Send via WhatsApp\" and attach the screenshot manually.",
            "If you cannot attach images, download the plain-text certificate instead.",
        ],
    }
}
