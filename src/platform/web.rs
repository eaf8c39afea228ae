//! Browser platform helpers

use web_sys::{Document, Element};

/// `performance.now()` in whole milliseconds
pub fn now_ms() -> u64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now().max(0.0) as u64)
        .unwrap_or(0)
}

pub fn document() -> Option<Document> {
    web_sys::window()?.document()
}

pub fn element(id: &str) -> Option<Element> {
    document()?.get_element_by_id(id)
}

/// Set the text of `#id`, if present
pub fn set_text(id: &str, text: &str) {
    if let Some(el) = element(id) {
        el.set_text_content(Some(text));
    }
}

/// Toggle the `hidden` class of `#id`
pub fn set_visible(id: &str, visible: bool) {
    if let Some(el) = element(id) {
        let _ = el.set_attribute("class", if visible { "" } else { "hidden" });
    }
}
