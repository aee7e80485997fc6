//! WASM bindings for the LabMetal certificate page
//!
//! All state lives in Rust behind a single [`CertificateApp`]. JavaScript
//! only wires form events and buttons to it.
//!
//! ## Architecture
//!
//! - `app`: the exported `CertificateApp`, one per page
//! - `dom`: render-target lookup and the live preview fill
//! - `canvas`, `snapshot`: the two DOM rasterization backends
//! - `host`: download, share sheet, deep links, timers and fetch
//! - `dataurl`: decoding `canvas.toDataURL()` output
//! - `logging`: `tracing` output routed to the browser console
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { CertificateApp } from './pkg/certificate_wasm.js';
//!
//! await init();
//!
//! const app = new CertificateApp();
//! await app.loadTemplate('./IMG/certificado.jpg');
//! await app.loadDirectory();
//!
//! form.addEventListener('input', () => app.updatePreview(readForm()));
//! captureButton.onclick = async () => {
//!     try {
//!         await app.capture(readForm());
//!         await app.share(readForm());
//!     } catch (message) {
//!         notify(message);
//!     }
//! };
//! ```

pub mod app;
pub mod canvas;
pub mod dataurl;
pub mod dom;
pub mod host;
pub mod logging;
pub mod snapshot;

use wasm_bindgen::prelude::*;

pub use app::CertificateApp;

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    logging::init("info");
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
