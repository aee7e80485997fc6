//! The page-level API exported to JavaScript.

use std::rc::Rc;

use certificate_core::{
    suggest_reference, CertificateRecord, ClientEntry, ContactInfo, DateLocale, DeviceClass,
    Field, LayoutTable, ToolConfig,
};
use certificate_render::{
    ArtifactKind, AttemptRecord, CertificateSession, HandoffAdapter, RenderStrategySelector,
    RenderTarget, SessionError, ShareReport, SyntheticCanvasBackend, Timer, VectorPdfBackend,
};
use serde::Serialize;
use tracing::{info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::HtmlImageElement;

use crate::canvas::CanvasRedrawBackend;
use crate::dom::{document, fill_preview, js_error, selector_list, DomTarget, SharedElements};
use crate::host::{fetch_bytes, fetch_text, BrowserDownload, BrowserTimer, NavigatorShare, WindowLinks};
use crate::snapshot::SvgSnapshotBackend;

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Read a plain `{ inputId: value }` object into a record
fn record_from_form(form: &JsValue) -> Result<CertificateRecord, JsValue> {
    if form.is_undefined() || form.is_null() {
        return Ok(CertificateRecord::new());
    }
    let json: String = js_sys::JSON::stringify(form)?.into();
    CertificateRecord::from_json(&json)
        .map_err(|e| JsValue::from_str(&format!("Invalid form data: {}", e)))
}

fn template_error(locale: DateLocale, detail: &str) -> JsValue {
    let message = match locale {
        DateLocale::Es => format!("No se pudo cargar la plantilla del certificado ({}).", detail),
        DateLocale::En => format!("The certificate template could not be loaded ({}).", detail),
    };
    JsValue::from_str(&message)
}

/// Directory match as handed to the autocomplete list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientMatch {
    pub index: usize,
    pub name: String,
    pub phone: String,
    pub company: Option<String>,
}

impl ClientMatch {
    fn new(index: usize, entry: ClientEntry) -> Self {
        Self {
            index,
            name: entry.name,
            phone: entry.phone,
            company: entry.company,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaptureSummary {
    generation: u64,
    backend: String,
    kind: ArtifactKind,
    mime_type: &'static str,
    bytes: usize,
    attempts: Vec<AttemptRecord>,
}

/// One certificate page: session state, backends and browser hand-off
#[wasm_bindgen]
pub struct CertificateApp {
    session: Rc<CertificateSession>,
    elements: SharedElements,
    device: DeviceClass,
}

#[wasm_bindgen]
impl CertificateApp {
    /// Build the app from optional JSON configuration and layout.
    /// Invalid configuration is fatal.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: Option<String>,
        layout_json: Option<String>,
    ) -> Result<CertificateApp, JsValue> {
        let config = match config_json {
            Some(json) => ToolConfig::from_json(&json).map_err(|e| JsValue::from_str(&e.to_string()))?,
            None => ToolConfig::default(),
        };
        let layout = match layout_json {
            Some(json) => {
                LayoutTable::from_json(&json).map_err(|e| JsValue::from_str(&e.to_string()))?
            }
            None => LayoutTable::labmetal_a4(),
        };
        let device = web_sys::window()
            .and_then(|w| w.navigator().user_agent().ok())
            .map(|ua| DeviceClass::from_user_agent(&ua))
            .unwrap_or_default();

        let elements = SharedElements::default();
        let timer: Rc<dyn Timer> = Rc::new(BrowserTimer);

        let mut selector = RenderStrategySelector::new(config.render.clone(), Rc::clone(&timer));
        selector.register(Rc::new(VectorPdfBackend::new()));
        selector.register(Rc::new(CanvasRedrawBackend::new(elements.clone())));
        selector.register(Rc::new(SvgSnapshotBackend::new(elements.clone())));
        selector.register(Rc::new(SyntheticCanvasBackend::new()));

        let mut handoff = HandoffAdapter::new(
            &config,
            Rc::clone(&timer),
            Rc::new(BrowserDownload),
            Rc::new(WindowLinks),
        );
        if NavigatorShare::is_present() {
            handoff = handoff.with_share_surface(Rc::new(NavigatorShare));
        }

        let session = CertificateSession::new(config, layout, selector, handoff, timer)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        info!(device = ?device, "certificate app ready");

        Ok(CertificateApp {
            session: Rc::new(session),
            elements,
            device,
        })
    }

    /// Fetch the certificate artwork. Resolves once the bytes are loaded;
    /// the on-page image keeps loading in the background.
    #[wasm_bindgen(js_name = loadTemplate)]
    pub fn load_template(&self, url: String) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        let elements = self.elements.clone();
        let locale = self.locale();
        future_to_promise(async move {
            let image = HtmlImageElement::new()?;
            image.set_src(&url);
            elements.set_template(Some(image));

            let bytes = fetch_bytes(&url)
                .await
                .map_err(|e| template_error(locale, &js_error(&e)))?;
            session
                .set_background(bytes)
                .map_err(|e| JsValue::from_str(&e.user_message(locale)))?;
            Ok(JsValue::TRUE)
        })
    }

    /// Fetch the client directory. A missing or broken directory resolves
    /// to zero clients; the form still works with typed-in details.
    #[wasm_bindgen(js_name = loadDirectory)]
    pub fn load_directory(&self) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        future_to_promise(async move {
            let url = session.config().directory.url.clone();
            let count = match fetch_text(&url).await {
                Ok(json) => session.load_directory_json(&json).unwrap_or(0),
                Err(e) => {
                    warn!(url = %url, error = %js_error(&e), "client directory not fetched");
                    0
                }
            };
            Ok(JsValue::from(count as u32))
        })
    }

    #[wasm_bindgen(js_name = filterClients)]
    pub fn filter_clients(&self, query: &str) -> Result<JsValue, JsValue> {
        let matches: Vec<ClientMatch> = self
            .session
            .filter_clients(query)
            .into_iter()
            .map(|(index, entry)| ClientMatch::new(index, entry))
            .collect();
        to_js(&matches)
    }

    #[wasm_bindgen(js_name = selectClient)]
    pub fn select_client(&self, index: usize) -> Result<JsValue, JsValue> {
        let contact = self
            .session
            .select_client(index)
            .map_err(|e| JsValue::from_str(&e.user_message(self.locale())))?;
        to_js(&contact)
    }

    /// Recipient typed by hand. Blank name and phone clear it.
    #[wasm_bindgen(js_name = setRecipient)]
    pub fn set_recipient(&self, name: String, phone: String, company: Option<String>) {
        let contact = if name.trim().is_empty() && phone.trim().is_empty() {
            None
        } else {
            Some(ContactInfo {
                name,
                phone,
                company: company.filter(|c| !c.trim().is_empty()),
            })
        };
        self.session.set_recipient(contact);
    }

    /// Re-layout the on-screen sheet from the current form values
    #[wasm_bindgen(js_name = updatePreview)]
    pub fn update_preview(&self, form: JsValue) -> Result<JsValue, JsValue> {
        let record = record_from_form(&form)?;
        let page = self.session.preview(&record);
        if let Some(target) = DomTarget::locate(&document()?, &selector_list(None)) {
            fill_preview(target.element(), &page)?;
        }
        to_js(&page)
    }

    /// Render the certificate with the first backend that works.
    /// `selectors` overrides the comma-separated render-target lookup.
    pub fn capture(&self, form: JsValue, selectors: Option<String>) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        let elements = self.elements.clone();
        let device = self.device;
        let locale = self.locale();
        future_to_promise(async move {
            let record = record_from_form(&form)?;
            let target = DomTarget::locate(&document()?, &selector_list(selectors.as_deref()));
            elements.set_target(target.as_ref().map(|t| t.element().clone()));

            let result = session
                .capture(&record, target.as_ref().map(|t| t as &dyn RenderTarget), device)
                .await;
            let report = result.map_err(|e| reject(&e, locale))?;
            to_js(&CaptureSummary {
                generation: report.generation,
                backend: report.artifact.backend.clone(),
                kind: report.artifact.kind,
                mime_type: report.artifact.mime_type(),
                bytes: report.artifact.len(),
                attempts: report.attempts,
            })
        })
    }

    /// Download the capture and offer it to the selected client
    pub fn share(&self, form: JsValue) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        let locale = self.locale();
        future_to_promise(async move {
            let record = record_from_form(&form)?;
            let report = session.share(&record).await.map_err(|e| reject(&e, locale))?;
            schedule_release(&session, &report);
            to_js(&report)
        })
    }

    /// Download the capture only
    pub fn download(&self, form: JsValue) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        let locale = self.locale();
        future_to_promise(async move {
            let record = record_from_form(&form)?;
            let report = session
                .download(&record)
                .await
                .map_err(|e| reject(&e, locale))?;
            schedule_release(&session, &report);
            to_js(&report)
        })
    }

    /// Download the plain-text certificate after every backend failed
    #[wasm_bindgen(js_name = textFallback)]
    pub fn text_fallback(&self, form: JsValue) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        let locale = self.locale();
        future_to_promise(async move {
            let record = record_from_form(&form)?;
            let report = session
                .text_fallback(&record)
                .await
                .map_err(|e| reject(&e, locale))?;
            schedule_release(&session, &report);
            to_js(&report)
        })
    }

    #[wasm_bindgen(js_name = suggestReference)]
    pub fn suggest_reference(&self, form: JsValue) -> Result<String, JsValue> {
        let record = record_from_form(&form)?;
        let today = chrono::Local::now().date_naive();
        let nonce = (js_sys::Math::random() * 1000.0) as u32;
        Ok(suggest_reference(
            record.get(Field::Client).unwrap_or_default(),
            record.get(Field::Material).unwrap_or_default(),
            today,
            nonce,
        ))
    }

    #[wasm_bindgen(getter, js_name = isBusy)]
    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    #[wasm_bindgen(getter, js_name = hasTemplate)]
    pub fn has_template(&self) -> bool {
        self.session.has_background()
    }

    pub fn cancel(&self) {
        self.session.cancel();
    }

    /// Clear the recipient and the capture. Template and directory stay.
    pub fn reset(&self) {
        self.session.reset();
        self.elements.set_target(None);
    }
}

impl CertificateApp {
    fn locale(&self) -> DateLocale {
        self.session.config().locale
    }
}

fn reject(err: &SessionError, locale: DateLocale) -> JsValue {
    warn!(error = %err, "certificate action failed");
    JsValue::from_str(&err.user_message(locale))
}

/// Release the hand-off's object URLs once the idle delay has passed
fn schedule_release(session: &Rc<CertificateSession>, report: &ShareReport) {
    let session = Rc::clone(session);
    let generation = report.generation;
    spawn_local(async move {
        session.release_after_idle(generation).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_client_match_serializes_flat() {
        let entry = ClientEntry {
            name: "Fernando Loyola".to_string(),
            phone: "983832001".to_string(),
            company: None,
        };
        let json = serde_json::to_value(ClientMatch::new(3, entry)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "index": 3,
                "name": "Fernando Loyola",
                "phone": "983832001",
                "company": null
            })
        );
    }
}
