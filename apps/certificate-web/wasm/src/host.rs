//! Browser implementations of the hand-off and timer seams:
//! object-URL downloads, the Web Share sheet, `window.open` deep links,
//! `setTimeout` sleeps and `fetch`.

use std::time::Duration;

use async_trait::async_trait;
use certificate_render::{
    DownloadSink, HandoffError, LinkOpener, RenderedArtifact, ResourceHandle, SavedArtifact,
    ShareError, ShareRequest, ShareSurface, Timer,
};
use js_sys::{Array, Function, Object, Reflect, Uint8Array};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Blob, BlobPropertyBag, DomException, File, FilePropertyBag, HtmlAnchorElement, Request,
    RequestInit, Response, Url,
};

use crate::dom::{document, js_error};

fn window() -> Result<web_sys::Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))
}

fn byte_parts(bytes: &[u8]) -> Array {
    Array::of1(&Uint8Array::from(bytes))
}

fn blob_for(artifact: &RenderedArtifact) -> Result<Blob, JsValue> {
    let options = BlobPropertyBag::new();
    options.set_type(artifact.mime_type());
    Blob::new_with_u8_array_sequence_and_options(&byte_parts(&artifact.bytes), &options)
}

fn file_for(bytes: &[u8], filename: &str, mime_type: &str) -> Result<File, JsValue> {
    let options = FilePropertyBag::new();
    options.set_type(mime_type);
    File::new_with_u8_array_sequence_and_options(&byte_parts(bytes), filename, &options)
}

// ============================================================
// Timer
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserTimer;

#[async_trait(?Send)]
impl Timer for BrowserTimer {
    async fn sleep(&self, duration: Duration) {
        let millis = duration.as_millis().min(i32::MAX as u128) as i32;
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            let scheduled = web_sys::window().map(|w| {
                w.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis)
            });
            if !matches!(scheduled, Some(Ok(_))) {
                let _ = resolve.call0(&JsValue::NULL);
            }
        });
        let _ = JsFuture::from(promise).await;
    }
}

// ============================================================
// Downloads
// ============================================================

/// Object URL backing a download; revoked on release
pub struct ObjectUrl(String);

impl ResourceHandle for ObjectUrl {
    fn describe(&self) -> String {
        self.0.clone()
    }

    fn release(self: Box<Self>) {
        if let Err(e) = Url::revoke_object_url(&self.0) {
            warn!(url = %self.0, error = %js_error(&e), "could not revoke object URL");
        }
    }
}

/// Saves artifacts through a temporary `<a download>` click
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserDownload;

impl BrowserDownload {
    fn trigger(artifact: &RenderedArtifact, filename: &str) -> Result<String, JsValue> {
        let url = Url::create_object_url_with_blob(&blob_for(artifact)?)?;
        let document = document()?;
        let anchor: HtmlAnchorElement = document.create_element("a")?.dyn_into()?;
        anchor.set_href(&url);
        anchor.set_download(filename);
        anchor.style().set_property("display", "none")?;

        let body = document
            .body()
            .ok_or_else(|| JsValue::from_str("Document has no body"))?;
        body.append_child(&anchor)?;
        anchor.click();
        anchor.remove();
        Ok(url)
    }
}

#[async_trait(?Send)]
impl DownloadSink for BrowserDownload {
    async fn save(
        &self,
        artifact: &RenderedArtifact,
        filename: &str,
    ) -> Result<SavedArtifact, HandoffError> {
        let url = Self::trigger(artifact, filename)
            .map_err(|e| HandoffError::Download(js_error(&e)))?;
        debug!(filename, url = %url, "download started");
        Ok(SavedArtifact {
            location: filename.to_string(),
            handle: Some(Box::new(ObjectUrl(url))),
        })
    }
}

// ============================================================
// Native share sheet
// ============================================================

fn navigator_method(name: &str) -> Option<(web_sys::Navigator, Function)> {
    let navigator = web_sys::window()?.navigator();
    let method = Reflect::get(&navigator, &name.into()).ok()?;
    let method = method.dyn_into::<Function>().ok()?;
    Some((navigator, method))
}

fn share_data(files: Option<&File>, title: &str, text: &str) -> Result<Object, JsValue> {
    let data = Object::new();
    if let Some(file) = files {
        Reflect::set(&data, &"files".into(), &Array::of1(file))?;
    }
    Reflect::set(&data, &"title".into(), &title.into())?;
    Reflect::set(&data, &"text".into(), &text.into())?;
    Ok(data)
}

/// `navigator.share` with files, where the browser supports it
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigatorShare;

impl NavigatorShare {
    pub fn is_present() -> bool {
        navigator_method("share").is_some()
    }
}

#[async_trait(?Send)]
impl ShareSurface for NavigatorShare {
    fn can_share(&self, mime_type: &str) -> bool {
        let Some((navigator, can_share)) = navigator_method("canShare") else {
            return false;
        };
        if !Self::is_present() {
            return false;
        }
        let probe = file_for(&[], "certificado", mime_type)
            .and_then(|file| share_data(Some(&file), "", ""));
        match probe {
            Ok(data) => can_share
                .call1(&navigator, &data)
                .map(|v| v.is_truthy())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn share(&self, request: ShareRequest<'_>) -> Result<(), ShareError> {
        let (navigator, share) = navigator_method("share").ok_or(ShareError::Unsupported)?;
        let file = file_for(
            &request.artifact.bytes,
            request.filename,
            request.artifact.mime_type(),
        )
        .map_err(|e| ShareError::Rejected(js_error(&e)))?;
        let data = share_data(Some(&file), request.title, request.text)
            .map_err(|e| ShareError::Rejected(js_error(&e)))?;

        let promise = share
            .call1(&navigator, &data)
            .map_err(|e| ShareError::Rejected(js_error(&e)))?;
        let promise: js_sys::Promise = promise
            .dyn_into()
            .map_err(|_| ShareError::Rejected("share() did not return a promise".to_string()))?;

        match JsFuture::from(promise).await {
            Ok(_) => Ok(()),
            Err(e) => match e.dyn_ref::<DomException>().map(|d| d.name()) {
                Some(name) if name == "AbortError" => Err(ShareError::Cancelled),
                Some(name) if name == "NotAllowedError" => Err(ShareError::Unsupported),
                _ => Err(ShareError::Rejected(js_error(&e))),
            },
        }
    }
}

// ============================================================
// Deep links
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowLinks;

impl LinkOpener for WindowLinks {
    fn open(&self, url: &str) -> Result<(), HandoffError> {
        let window = window().map_err(|e| HandoffError::Link(js_error(&e)))?;
        match window.open_with_url_and_target(url, "_blank") {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(HandoffError::Link("popup blocked".to_string())),
            Err(e) => Err(HandoffError::Link(js_error(&e))),
        }
    }
}

// ============================================================
// Fetch
// ============================================================

async fn fetch(url: &str) -> Result<Response, JsValue> {
    let opts = RequestInit::new();
    opts.set_method("GET");
    let request = Request::new_with_str_and_init(url, &opts)?;

    let response = JsFuture::from(window()?.fetch_with_request(&request)).await?;
    let response: Response = response.dyn_into()?;
    if !response.ok() {
        return Err(JsValue::from_str(&format!(
            "GET {} failed: {}",
            url,
            response.status()
        )));
    }
    Ok(response)
}

pub async fn fetch_bytes(url: &str) -> Result<Vec<u8>, JsValue> {
    let buffer = JsFuture::from(fetch(url).await?.array_buffer()?).await?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

pub async fn fetch_text(url: &str) -> Result<String, JsValue> {
    JsFuture::from(fetch(url).await?.text()?)
        .await?
        .as_string()
        .ok_or_else(|| JsValue::from_str("Response body is not text"))
}
