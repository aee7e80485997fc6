//! Consolidated session state
//!
//! One `CertificateSession` per page. It owns the client directory, the
//! selected client, the background template and the live-artifact slot,
//! and drives the composer, selector and hand-off adapter. State sits in a
//! `RefCell` whose borrows never cross an `.await`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use certificate_core::dates::parse_iso_date;
use certificate_core::{
    artifact_filename, plain_text_certificate, share_message, CertificateRecord, ClientDirectory,
    ClientEntry, ComposeError, Composer, ConfigError, ContactInfo, DateLocale, DeviceClass,
    DirectoryError, Field, LayoutTable, PageDescription, TemplateImage, ToolConfig,
};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactKind, ArtifactSlot, RenderedArtifact};
use crate::backend::RenderTarget;
use crate::error::{HandoffError, RenderError};
use crate::export::{HandoffAdapter, HandoffPath};
use crate::fallback::manual_capture_steps;
use crate::selector::{AttemptRecord, RenderStrategySelector};
use crate::timer::Timer;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("No certificate has been captured yet")]
    NothingCaptured,

    #[error("No client at index {0}")]
    UnknownClient(usize),
}

impl SessionError {
    /// What the operator should do next. Never a raw error string.
    pub fn user_message(&self, locale: DateLocale) -> String {
        let say = |es: &str, en: &str| match locale {
            DateLocale::Es => es.to_string(),
            DateLocale::En => en.to_string(),
        };
        match self {
            SessionError::Compose(ComposeError::MissingRequiredField(field)) => say(
                &format!("Completa el campo «{}» antes de generar el certificado.", field.label()),
                &format!("Fill in \"{}\" before generating the certificate.", field.label()),
            ),
            SessionError::Compose(ComposeError::InvalidTemplate(_)) => say(
                "La plantilla del certificado no es una imagen PNG o JPEG válida. Vuelve a cargarla.",
                "The certificate template is not a valid PNG or JPEG image. Load it again.",
            ),
            SessionError::Render(RenderError::AllBackendsExhausted(_)) => {
                let header = say(
                    "No se pudo generar el archivo automáticamente. Hazlo a mano:",
                    "The file could not be generated automatically. Do it by hand:",
                );
                let steps: Vec<String> = manual_capture_steps(locale)
                    .iter()
                    .enumerate()
                    .map(|(i, step)| format!("{}. {}", i + 1, step))
                    .collect();
                format!("{}\n{}", header, steps.join("\n"))
            }
            SessionError::Render(RenderError::Busy) => say(
                "Ya se está generando un certificado. Espera a que termine.",
                "A certificate is already being generated. Wait for it to finish.",
            ),
            SessionError::Render(RenderError::Cancelled) => say(
                "Generación cancelada. Pulsa «Capturar» para intentarlo de nuevo.",
                "Generation cancelled. Press \"Capture\" to try again.",
            ),
            SessionError::Handoff(_) => say(
                "No se pudo descargar el archivo. Inténtalo de nuevo o descarga el certificado en texto.",
                "The file could not be downloaded. Try again or download the plain-text certificate.",
            ),
            SessionError::Directory(_) => say(
                "No se pudo cargar la lista de clientes. Escribe los datos del cliente a mano.",
                "The client list could not be loaded. Type the client details by hand.",
            ),
            SessionError::NothingCaptured => say(
                "Primero genera el certificado con «Capturar».",
                "Generate the certificate with \"Capture\" first.",
            ),
            SessionError::UnknownClient(_) => say(
                "Ese cliente ya no está en la lista. Búscalo de nuevo.",
                "That client is no longer in the list. Search again.",
            ),
        }
    }
}

/// A finished capture
#[derive(Debug)]
pub struct CaptureReport {
    pub generation: u64,
    pub artifact: Arc<RenderedArtifact>,
    pub attempts: Vec<AttemptRecord>,
}

/// A finished hand-off
#[derive(Debug, Clone, Serialize)]
pub struct ShareReport {
    pub generation: u64,
    pub filename: String,
    pub saved_to: String,
    #[serde(flatten)]
    pub path: HandoffPath,
    pub notice: Option<String>,
}

#[derive(Default)]
struct SessionState {
    directory: ClientDirectory,
    selected: Option<ContactInfo>,
    background: Option<Arc<TemplateImage>>,
    slot: ArtifactSlot,
}

pub struct CertificateSession {
    config: ToolConfig,
    composer: Composer,
    selector: RenderStrategySelector,
    handoff: HandoffAdapter,
    timer: Rc<dyn Timer>,
    state: RefCell<SessionState>,
}

impl CertificateSession {
    /// Validate configuration and layout, then start an empty session
    pub fn new(
        config: ToolConfig,
        layout: LayoutTable,
        selector: RenderStrategySelector,
        handoff: HandoffAdapter,
        timer: Rc<dyn Timer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        layout.validate()?;
        info!(
            layout = %layout.name,
            backends = ?selector.order(),
            registered = ?selector.registered(),
            "certificate session ready"
        );
        Ok(Self {
            composer: Composer::new(layout, config.locale),
            config,
            selector,
            handoff,
            timer,
            state: RefCell::new(SessionState::default()),
        })
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn selector(&self) -> &RenderStrategySelector {
        &self.selector
    }

    /// Replace the client directory. Malformed input leaves an empty
    /// directory behind and reports the error.
    pub fn load_directory_json(&self, json: &str) -> Result<usize, SessionError> {
        let mut state = self.state.borrow_mut();
        match ClientDirectory::from_json(json) {
            Ok(directory) => {
                let count = directory.len();
                state.directory = directory;
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "client directory unavailable, continuing without it");
                state.directory = ClientDirectory::default();
                Err(e.into())
            }
        }
    }

    pub fn directory_len(&self) -> usize {
        self.state.borrow().directory.len()
    }

    /// Prefix matches, capped at the configured maximum
    pub fn filter_clients(&self, query: &str) -> Vec<(usize, ClientEntry)> {
        let state = self.state.borrow();
        state
            .directory
            .filter(query, self.config.directory.max_matches)
            .into_iter()
            .map(|(i, entry)| (i, entry.clone()))
            .collect()
    }

    pub fn select_client(&self, index: usize) -> Result<ContactInfo, SessionError> {
        let mut state = self.state.borrow_mut();
        let contact = state
            .directory
            .get(index)
            .map(ClientEntry::contact)
            .ok_or(SessionError::UnknownClient(index))?;
        debug!(client = %contact.name, "client selected");
        state.selected = Some(contact.clone());
        Ok(contact)
    }

    /// Use a contact typed by hand instead of one from the directory
    pub fn set_recipient(&self, contact: Option<ContactInfo>) {
        self.state.borrow_mut().selected = contact;
    }

    pub fn selected_client(&self) -> Option<ContactInfo> {
        self.state.borrow().selected.clone()
    }

    pub fn set_background(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        let template = TemplateImage::from_bytes(bytes)?;
        info!(
            width = template.width_px,
            height = template.height_px,
            kind = ?template.kind,
            "background template loaded"
        );
        self.state.borrow_mut().background = Some(Arc::new(template));
        Ok(())
    }

    pub fn has_background(&self) -> bool {
        self.state.borrow().background.is_some()
    }

    /// Live layout for the on-screen preview; never fails
    pub fn preview(&self, record: &CertificateRecord) -> PageDescription {
        let mut page = self.composer.preview(record);
        page.background = self.state.borrow().background.clone();
        page
    }

    /// Compose, render and make the result the live artifact.
    ///
    /// The previous live artifact is released as soon as a new capture
    /// starts, even if that capture later fails.
    pub async fn capture(
        &self,
        record: &CertificateRecord,
        target: Option<&dyn RenderTarget>,
        device: DeviceClass,
    ) -> Result<CaptureReport, SessionError> {
        if self.selector.is_busy() {
            return Err(RenderError::Busy.into());
        }
        let background = self.state.borrow().background.clone();
        let page = self.composer.compose(record, background)?;

        self.state.borrow_mut().slot.release();

        let outcome = self.selector.render(&page, target, device).await?;
        let (generation, artifact) = self.state.borrow_mut().slot.store(outcome.artifact);
        info!(
            generation,
            backend = %artifact.backend,
            bytes = artifact.len(),
            "capture stored"
        );
        Ok(CaptureReport {
            generation,
            artifact,
            attempts: outcome.attempts,
        })
    }

    fn issue_date(record: &CertificateRecord) -> NaiveDate {
        record
            .get(Field::IssueDate)
            .and_then(parse_iso_date)
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    fn live(&self) -> Result<(u64, Arc<RenderedArtifact>), SessionError> {
        let state = self.state.borrow();
        match (state.slot.live_generation(), state.slot.current()) {
            (Some(generation), Some(artifact)) => Ok((generation, artifact)),
            _ => Err(SessionError::NothingCaptured),
        }
    }

    async fn hand_off(
        &self,
        record: &CertificateRecord,
        recipient: Option<&ContactInfo>,
    ) -> Result<ShareReport, SessionError> {
        let (generation, artifact) = self.live()?;
        let filename = artifact_filename(
            record.get(Field::Client),
            Self::issue_date(record),
            artifact.extension(),
        );
        let message = share_message(record, recipient, &self.config.lab_name, self.config.locale);

        let outcome = self
            .handoff
            .export_and_offer(&artifact, &filename, recipient, &message)
            .await?;

        let mut state = self.state.borrow_mut();
        for handle in outcome.handles {
            state.slot.attach(generation, handle);
        }
        Ok(ShareReport {
            generation,
            filename,
            saved_to: outcome.saved_to,
            path: outcome.path,
            notice: outcome.notice,
        })
    }

    /// Download the live artifact and offer it to the selected client
    pub async fn share(&self, record: &CertificateRecord) -> Result<ShareReport, SessionError> {
        let recipient = self.selected_client();
        self.hand_off(record, recipient.as_ref()).await
    }

    /// Download the live artifact only
    pub async fn download(&self, record: &CertificateRecord) -> Result<ShareReport, SessionError> {
        self.hand_off(record, None).await
    }

    /// Wait out the configured delay, then release `generation` if it is
    /// still live. A newer capture is never touched.
    pub async fn release_after_idle(&self, generation: u64) -> bool {
        self.timer.sleep(self.config.handoff.release_delay()).await;
        let released = self.state.borrow_mut().slot.release_generation(generation);
        debug!(generation, released, "idle release");
        released
    }

    /// Store and download the plain-text certificate when no backend could
    /// produce a file
    pub async fn text_fallback(&self, record: &CertificateRecord) -> Result<ShareReport, SessionError> {
        let text = plain_text_certificate(record, &self.config.lab_name, self.config.locale);
        let artifact = RenderedArtifact::new(ArtifactKind::Text, text.into_bytes(), "plain-text");
        self.state.borrow_mut().slot.store(artifact);
        self.hand_off(record, None).await
    }

    pub fn live_artifact(&self) -> Option<Arc<RenderedArtifact>> {
        self.state.borrow().slot.current()
    }

    pub fn is_busy(&self) -> bool {
        self.selector.is_busy()
    }

    /// Abort the render in flight at its next suspension point
    pub fn cancel(&self) {
        self.selector.cancel_token().cancel();
    }

    /// Forget the selected client and release the live artifact. The
    /// directory and background stay loaded.
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.selected = None;
        state.slot.release();
        debug!("session reset");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::{BackendKind, RenderBackend};
    use crate::export::testing::{RecordingDownloads, RecordingLinks};
    use crate::selector::testing::ScriptedBackend;
    use crate::timer::testing::InstantTimer;
    use certificate_core::RenderConfig;
    use pretty_assertions::assert_eq;

    const DIRECTORY: &str = r#"{"clientes": [
        {"NombreCliente": "Fernando Loyola", "Telefono": "983 832 001", "empresa": "Minera Sur"},
        {"NombreCliente": "Flor Quispe", "Telefono": 51955111222}
    ]}"#;

    struct Harness {
        timer: InstantTimer,
        downloads: RecordingDownloads,
        links: RecordingLinks,
        session: CertificateSession,
    }

    fn harness(backends: Vec<Rc<ScriptedBackend>>) -> Harness {
        let timer = InstantTimer::default();
        let downloads = RecordingDownloads::default();
        let links = RecordingLinks::default();

        let mut config = ToolConfig::default();
        config.render = RenderConfig {
            backend_order: backends.iter().map(|b| b.name().to_string()).collect(),
            ..RenderConfig::default()
        };

        let mut selector = RenderStrategySelector::new(config.render.clone(), Rc::new(timer.clone()));
        for backend in backends {
            selector.register(backend);
        }
        let handoff = HandoffAdapter::new(
            &config,
            Rc::new(timer.clone()),
            Rc::new(downloads.clone()),
            Rc::new(links.clone()),
        );
        let session = CertificateSession::new(
            config,
            LayoutTable::labmetal_a4(),
            selector,
            handoff,
            Rc::new(timer.clone()),
        )
        .unwrap();

        Harness {
            timer,
            downloads,
            links,
            session,
        }
    }

    fn working() -> Harness {
        harness(vec![ScriptedBackend::working("vector-pdf", BackendKind::Vector)])
    }

    #[tokio::test]
    async fn test_missing_required_field_aborts_before_any_backend() {
        let backend = ScriptedBackend::working("vector-pdf", BackendKind::Vector);
        let h = harness(vec![backend.clone()]);
        let record = CertificateRecord::new().with(Field::Client, "Fernando Loyola");

        let err = h
            .session
            .capture(&record, None, DeviceClass::Desktop)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Compose(ComposeError::MissingRequiredField(Field::Material))
        ));
        assert_eq!(backend.executed.get(), 0);
        assert!(err.user_message(DateLocale::Es).contains("Material"));
    }

    #[tokio::test]
    async fn test_second_capture_releases_previous_handles_once() {
        let h = working();
        let record = CertificateRecord::sample();

        let first = h.session.capture(&record, None, DeviceClass::Desktop).await.unwrap();
        h.session.download(&record).await.unwrap();
        let releases = h.downloads.releases.clone();
        let filename = h.downloads.saved.borrow()[0].clone();
        assert_eq!(releases.count(&filename), 0);

        let second = h.session.capture(&record, None, DeviceClass::Desktop).await.unwrap();
        assert_eq!(second.generation, first.generation + 1);
        assert_eq!(releases.count(&filename), 1);

        // The stale idle timer of the first capture must not touch the second
        assert!(!h.session.release_after_idle(first.generation).await);
        assert_eq!(releases.count(&filename), 1);
        assert!(h.session.live_artifact().is_some());

        h.session.reset();
        assert_eq!(releases.count(&filename), 1);
    }

    #[tokio::test]
    async fn test_idle_release_frees_live_artifact() {
        let h = working();
        let record = CertificateRecord::sample();
        let capture = h.session.capture(&record, None, DeviceClass::Desktop).await.unwrap();
        h.session.download(&record).await.unwrap();

        assert!(h.session.release_after_idle(capture.generation).await);
        assert!(h.session.live_artifact().is_none());
        assert_eq!(h.downloads.releases.released().len(), 1);
        assert!(h.timer.requested().contains(&Duration::from_millis(600_000)));
    }

    #[tokio::test]
    async fn test_share_uses_selected_client_and_names_file() {
        let h = working();
        assert_eq!(h.session.load_directory_json(DIRECTORY).unwrap(), 2);

        let matches = h.session.filter_clients("fer");
        assert_eq!(matches.len(), 1);
        let contact = h.session.select_client(matches[0].0).unwrap();
        assert_eq!(contact.company.as_deref(), Some("Minera Sur"));

        let record = CertificateRecord::sample();
        h.session.capture(&record, None, DeviceClass::Desktop).await.unwrap();
        let report = h.session.share(&record).await.unwrap();

        assert_eq!(report.filename, "certificado_FERNANDO_LOYOLA_2025-09-20.png");
        let HandoffPath::DeepLink { url } = &report.path else {
            panic!("expected deep link, got {:?}", report.path);
        };
        assert!(url.starts_with("https://wa.me/51983832001?text="));
        assert_eq!(h.links.opened.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_share_before_capture_is_actionable() {
        let h = working();
        let err = h.session.share(&CertificateRecord::sample()).await.unwrap_err();
        assert!(matches!(err, SessionError::NothingCaptured));
        assert!(err.user_message(DateLocale::En).contains("Capture"));
    }

    #[tokio::test]
    async fn test_exhaustion_message_lists_manual_steps() {
        let h = harness(vec![ScriptedBackend::unavailable("vector-pdf")]);
        let err = h
            .session
            .capture(&CertificateRecord::sample(), None, DeviceClass::Desktop)
            .await
            .unwrap_err();
        let message = err.user_message(DateLocale::Es);
        assert!(message.contains("1. "));
        assert!(message.contains("5. "));

        let report = h.session.text_fallback(&CertificateRecord::sample()).await.unwrap();
        assert!(report.filename.ends_with(".txt"));
        assert_eq!(h.session.live_artifact().unwrap().kind, ArtifactKind::Text);
    }

    #[test]
    fn test_malformed_directory_leaves_empty_list() {
        let h = working();
        h.session.load_directory_json(DIRECTORY).unwrap();
        assert!(h.session.load_directory_json("{not json").is_err());
        assert_eq!(h.session.directory_len(), 0);
        assert!(h.session.filter_clients("f").is_empty());
        assert!(matches!(
            h.session.select_client(0),
            Err(SessionError::UnknownClient(0))
        ));
    }

    #[test]
    fn test_invalid_layout_is_fatal_at_startup() {
        let timer = InstantTimer::default();
        let config = ToolConfig::default();
        let mut layout = LayoutTable::labmetal_a4();
        layout.entries.retain(|e| e.field != Field::Reference);

        let result = CertificateSession::new(
            config.clone(),
            layout,
            RenderStrategySelector::new(config.render.clone(), Rc::new(timer.clone())),
            HandoffAdapter::new(
                &config,
                Rc::new(timer.clone()),
                Rc::new(RecordingDownloads::default()),
                Rc::new(RecordingLinks::default()),
            ),
            Rc::new(timer),
        );
        assert!(matches!(
            result,
            Err(ConfigError::MissingLayoutEntry(Field::Reference))
        ));
    }
}
