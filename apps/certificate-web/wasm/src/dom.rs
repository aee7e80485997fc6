//! Render-target lookup and the live preview.

use std::cell::RefCell;
use std::rc::Rc;

use certificate_core::{DrawInstruction, Field, PageDescription, Weight};
use certificate_render::{RenderTarget, TargetSize};
use js_sys::Reflect;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, HtmlElement, HtmlImageElement};

/// Where the certificate sheet may live, most specific first
pub const DEFAULT_TARGET_SELECTORS: [&str; 5] = [
    "#hojaDocumento",
    ".document-sheet",
    ".hoja-documento",
    "div[id*=\"hoja\"]",
    "div[class*=\"document\"]",
];

/// Elements shared between the app and the DOM backends
#[derive(Clone, Default)]
pub struct SharedElements {
    template: Rc<RefCell<Option<HtmlImageElement>>>,
    target: Rc<RefCell<Option<HtmlElement>>>,
}

impl SharedElements {
    pub fn template(&self) -> Option<HtmlImageElement> {
        self.template.borrow().clone()
    }

    pub fn set_template(&self, image: Option<HtmlImageElement>) {
        *self.template.borrow_mut() = image;
    }

    pub fn target(&self) -> Option<HtmlElement> {
        self.target.borrow().clone()
    }

    pub fn set_target(&self, element: Option<HtmlElement>) {
        *self.target.borrow_mut() = element;
    }
}

/// Best-effort text for a thrown JS value
pub fn js_error(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    Reflect::get(value, &"message".into())
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{:?}", value))
}

pub fn document() -> Result<Document, JsValue> {
    web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("No document available"))
}

/// Load `src` into a fresh image element and wait for it to decode
pub async fn load_image(src: &str) -> Result<HtmlImageElement, JsValue> {
    let image = HtmlImageElement::new()?;
    let promise = js_sys::Promise::new(&mut |resolve, reject| {
        image.set_onload(Some(&resolve));
        image.set_onerror(Some(&reject));
    });
    image.set_src(src);
    JsFuture::from(promise).await?;
    image.set_onload(None);
    image.set_onerror(None);
    Ok(image)
}

/// Split a comma-separated selector list, keeping its order
pub fn selector_list(selectors: Option<&str>) -> Vec<String> {
    match selectors {
        Some(list) if !list.trim().is_empty() => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => DEFAULT_TARGET_SELECTORS
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

/// The on-screen certificate sheet
pub struct DomTarget {
    element: HtmlElement,
    selector: String,
}

impl DomTarget {
    /// First element with a non-zero layout size, or else the first match
    pub fn locate(document: &Document, selectors: &[String]) -> Option<DomTarget> {
        let mut fallback = None;
        for selector in selectors {
            let element = match document.query_selector(selector) {
                Ok(Some(element)) => element,
                Ok(None) => continue,
                Err(e) => {
                    warn!(selector = %selector, error = %js_error(&e), "invalid target selector");
                    continue;
                }
            };
            let Ok(element) = element.dyn_into::<HtmlElement>() else {
                continue;
            };
            let target = DomTarget {
                element,
                selector: selector.clone(),
            };
            let visible = target.measure().map(|s| !s.is_zero()).unwrap_or(false);
            if visible {
                debug!(selector = %selector, "render target located");
                return Some(target);
            }
            if fallback.is_none() {
                fallback = Some(target);
            }
        }
        if let Some(target) = &fallback {
            debug!(selector = %target.selector, "render target located with zero size");
        }
        fallback
    }

    pub fn element(&self) -> &HtmlElement {
        &self.element
    }
}

impl RenderTarget for DomTarget {
    fn describe(&self) -> String {
        self.selector.clone()
    }

    fn measure(&self) -> Option<TargetSize> {
        if !self.element.is_connected() {
            return None;
        }
        Some(TargetSize::new(
            self.element.offset_width() as f64,
            self.element.offset_height() as f64,
        ))
    }

    fn force_visible(&self) -> bool {
        let style = self.element.style();
        let shown = style.set_property("display", "block").is_ok()
            && style.set_property("visibility", "visible").is_ok();
        self.element.scroll_into_view();
        shown
    }
}

/// Inline style placing a preview element where the composer put the text.
///
/// Positions are percentages of the page so the preview scales with the
/// sheet. Text sits on its baseline.
pub fn placement_style(instruction: &DrawInstruction, page: &PageDescription) -> String {
    let left = instruction.x_mm / page.page.width_mm * 100.0;
    let top = instruction.y_mm / page.page.height_mm * 100.0;
    let weight = match instruction.weight {
        Weight::Bold => "bold",
        Weight::Normal => "normal",
    };
    format!(
        "position: absolute; left: {:.3}%; top: {:.3}%; font-size: {:.1}pt; font-weight: {}; \
         line-height: 1; white-space: pre-line; transform: translateY(-0.8em);",
        left, top, instruction.size_pt, weight
    )
}

/// Write the composed text into the `[data-field]` elements under `root`
pub fn fill_preview(root: &HtmlElement, page: &PageDescription) -> Result<usize, JsValue> {
    let mut filled = 0;
    for field in Field::ALL {
        let selector = format!("[data-field=\"{}\"]", field.as_str());
        let Some(element) = root.query_selector(&selector)? else {
            continue;
        };
        let first = page.instructions.iter().find(|i| i.field == field);
        match first {
            Some(instruction) => {
                element.set_text_content(page.text_for(field).as_deref());
                element.set_attribute("style", &placement_style(instruction, page))?;
                filled += 1;
            }
            None => element.set_text_content(None),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use certificate_core::{CertificateRecord, Composer};

    #[test]
    fn test_default_selectors_keep_priority() {
        let list = selector_list(None);
        assert_eq!(list[0], "#hojaDocumento");
        assert_eq!(list.len(), DEFAULT_TARGET_SELECTORS.len());
        assert_eq!(selector_list(Some("  ")), list);
    }

    #[test]
    fn test_custom_selectors_split_in_order() {
        assert_eq!(
            selector_list(Some("#sheet, .preview ,")),
            vec!["#sheet".to_string(), ".preview".to_string()]
        );
    }

    #[test]
    fn test_placement_style_uses_page_percentages() {
        let page = Composer::default()
            .compose(&CertificateRecord::sample(), None)
            .unwrap();
        let client = page
            .instructions
            .iter()
            .find(|i| i.field == Field::Client)
            .unwrap();
        let style = placement_style(client, &page);

        let left = client.x_mm / page.page.width_mm * 100.0;
        assert!(style.contains(&format!("left: {:.3}%", left)));
        assert!(style.contains("font-weight: normal"));
        assert!(style.starts_with("position: absolute;"));

        let result = page
            .instructions
            .iter()
            .find(|i| i.field == Field::GramsPerTonneResult)
            .unwrap();
        assert!(placement_style(result, &page).contains("font-weight: bold"));
    }
}
