//! Export/Handoff Adapter
//!
//! Gets a finished artifact to the operator and, when a recipient is known,
//! towards the client. The download always happens first so the operator
//! keeps a copy whatever the share path does. A native share sheet is tried
//! next; when it is missing or does not complete, a messaging deep link is
//! opened with a note that the file has to be attached by hand.

use std::rc::Rc;

use async_trait::async_trait;
use certificate_core::config::{HandoffConfig, MessagingConfig};
use certificate_core::{deep_link, manual_attach_note, normalize_phone, ContactInfo, DateLocale, ToolConfig};
use serde::Serialize;
use tracing::{info, warn};

use crate::artifact::{RenderedArtifact, ResourceHandle};
use crate::error::{HandoffError, ShareError};
use crate::timer::Timer;

/// Where a download ended up, plus the host resource backing it
pub struct SavedArtifact {
    pub location: String,
    pub handle: Option<Box<dyn ResourceHandle>>,
}

#[async_trait(?Send)]
pub trait DownloadSink {
    async fn save(
        &self,
        artifact: &RenderedArtifact,
        filename: &str,
    ) -> Result<SavedArtifact, HandoffError>;
}

pub struct ShareRequest<'a> {
    pub artifact: &'a RenderedArtifact,
    pub filename: &'a str,
    pub title: &'a str,
    pub text: &'a str,
}

/// Native share sheet
#[async_trait(?Send)]
pub trait ShareSurface {
    /// Whether files of this MIME type can be handed to the sheet
    fn can_share(&self, mime_type: &str) -> bool;

    async fn share(&self, request: ShareRequest<'_>) -> Result<(), ShareError>;
}

pub trait LinkOpener {
    fn open(&self, url: &str) -> Result<(), HandoffError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "path", rename_all = "kebab-case")]
pub enum HandoffPath {
    DownloadOnly,
    NativeShare,
    DeepLink { url: String },
}

pub struct HandoffOutcome {
    pub path: HandoffPath,
    /// Download location reported by the sink
    pub saved_to: String,
    /// Handles the caller must release once the hand-off is stale
    pub handles: Vec<Box<dyn ResourceHandle>>,
    /// Something the operator should be told
    pub notice: Option<String>,
}

impl std::fmt::Debug for HandoffOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffOutcome")
            .field("path", &self.path)
            .field("saved_to", &self.saved_to)
            .field("handles", &self.handles.len())
            .field("notice", &self.notice)
            .finish()
    }
}

fn no_phone_notice(locale: DateLocale, name: &str) -> String {
    match locale {
        DateLocale::Es => format!(
            "{} no tiene un teléfono válido. El certificado se descargó; envíalo manualmente.",
            name
        ),
        DateLocale::En => format!(
            "{} has no usable phone number. The certificate was downloaded; send it manually.",
            name
        ),
    }
}

fn link_failed_notice(locale: DateLocale, url: &str) -> String {
    match locale {
        DateLocale::Es => format!("No se pudo abrir WhatsApp. Abre este enlace manualmente: {}", url),
        DateLocale::En => format!("Could not open the messaging app. Open this link manually: {}", url),
    }
}

pub struct HandoffAdapter {
    messaging: MessagingConfig,
    handoff: HandoffConfig,
    locale: DateLocale,
    timer: Rc<dyn Timer>,
    downloads: Rc<dyn DownloadSink>,
    share: Option<Rc<dyn ShareSurface>>,
    links: Rc<dyn LinkOpener>,
}

impl HandoffAdapter {
    pub fn new(
        config: &ToolConfig,
        timer: Rc<dyn Timer>,
        downloads: Rc<dyn DownloadSink>,
        links: Rc<dyn LinkOpener>,
    ) -> Self {
        Self {
            messaging: config.messaging.clone(),
            handoff: config.handoff,
            locale: config.locale,
            timer,
            downloads,
            share: None,
            links,
        }
    }

    pub fn with_share_surface(mut self, surface: Rc<dyn ShareSurface>) -> Self {
        self.share = Some(surface);
        self
    }

    pub fn handoff_config(&self) -> &HandoffConfig {
        &self.handoff
    }

    /// Download the artifact, then offer it to `recipient`.
    ///
    /// Only a failed download is an error; every share problem degrades to
    /// the next path and, at worst, a notice.
    pub async fn export_and_offer(
        &self,
        artifact: &RenderedArtifact,
        filename: &str,
        recipient: Option<&ContactInfo>,
        message: &str,
    ) -> Result<HandoffOutcome, HandoffError> {
        let saved = self.downloads.save(artifact, filename).await?;
        info!(filename, location = %saved.location, backend = %artifact.backend, "artifact downloaded");

        let mut outcome = HandoffOutcome {
            path: HandoffPath::DownloadOnly,
            saved_to: saved.location,
            handles: saved.handle.into_iter().collect(),
            notice: None,
        };

        let Some(recipient) = recipient else {
            return Ok(outcome);
        };

        let phone = match normalize_phone(&recipient.phone, &self.messaging.country_prefix) {
            Ok(phone) => phone,
            Err(e) => {
                warn!(recipient = %recipient.name, error = %e, "recipient has no usable phone");
                outcome.notice = Some(no_phone_notice(self.locale, &recipient.name));
                return Ok(outcome);
            }
        };

        if let Some(surface) = &self.share {
            if surface.can_share(artifact.mime_type()) {
                let request = ShareRequest {
                    artifact,
                    filename,
                    title: filename,
                    text: message,
                };
                match surface.share(request).await {
                    Ok(()) => {
                        info!(recipient = %recipient.name, "shared through the native sheet");
                        outcome.path = HandoffPath::NativeShare;
                        return Ok(outcome);
                    }
                    Err(e) => info!(error = %e, "native share did not complete, using deep link"),
                }
            }
        }

        self.timer.sleep(self.handoff.link_delay()).await;

        let text = format!("{}\n\n{}", message, manual_attach_note(self.locale));
        let url = deep_link(&self.messaging.base_url, &phone, &text);
        if let Err(e) = self.links.open(&url) {
            warn!(error = %e, "could not open deep link");
            outcome.notice = Some(link_failed_notice(self.locale, &url));
        }
        outcome.path = HandoffPath::DeepLink { url };
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use super::*;
    use crate::artifact::testing::ReleaseLog;

    /// Records saves and hands out counted handles named after the file
    #[derive(Clone, Default)]
    pub struct RecordingDownloads {
        pub saved: Rc<RefCell<Vec<String>>>,
        pub releases: ReleaseLog,
        pub fail: bool,
    }

    #[async_trait(?Send)]
    impl DownloadSink for RecordingDownloads {
        async fn save(
            &self,
            _artifact: &RenderedArtifact,
            filename: &str,
        ) -> Result<SavedArtifact, HandoffError> {
            if self.fail {
                return Err(HandoffError::Download("disk full".to_string()));
            }
            self.saved.borrow_mut().push(filename.to_string());
            Ok(SavedArtifact {
                location: format!("blob:{}", filename),
                handle: Some(self.releases.handle(filename)),
            })
        }
    }

    pub struct ScriptedShare {
        pub accepts: bool,
        pub result: Result<(), ShareError>,
        pub calls: RefCell<u32>,
    }

    impl ScriptedShare {
        pub fn new(accepts: bool, result: Result<(), ShareError>) -> Self {
            Self {
                accepts,
                result,
                calls: RefCell::new(0),
            }
        }
    }

    #[async_trait(?Send)]
    impl ShareSurface for ScriptedShare {
        fn can_share(&self, _mime_type: &str) -> bool {
            self.accepts
        }

        async fn share(&self, _request: ShareRequest<'_>) -> Result<(), ShareError> {
            *self.calls.borrow_mut() += 1;
            self.result.clone()
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingLinks {
        pub opened: Rc<RefCell<Vec<String>>>,
    }

    impl LinkOpener for RecordingLinks {
        fn open(&self, url: &str) -> Result<(), HandoffError> {
            self.opened.borrow_mut().push(url.to_string());
            Ok(())
        }
    }
}
