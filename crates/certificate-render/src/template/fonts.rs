//! Embedded fonts for the template rasterizer
//!
//! Fonts come from typst-assets only, so output does not depend on what the
//! host has installed. The cache is built once and shared.

use std::sync::OnceLock;

use typst::foundations::Bytes;
use typst::text::{Font, FontBook};
use typst::utils::LazyHash;

/// Face the certificate text is set in
pub const CERTIFICATE_FAMILY: &str = "Libertinus Serif";

static FONT_CACHE: OnceLock<FontCache> = OnceLock::new();

/// Get the global font cache, initializing it if necessary
pub fn global_font_cache() -> &'static FontCache {
    FONT_CACHE.get_or_init(FontCache::new)
}

#[derive(Debug)]
pub struct FontCache {
    book: LazyHash<FontBook>,
    fonts: Vec<Font>,
}

impl FontCache {
    pub fn new() -> Self {
        let mut book = FontBook::new();
        let mut fonts = Vec::new();

        for data in typst_assets::fonts() {
            let buffer = Bytes::from_static(data);
            for font in Font::iter(buffer) {
                book.push(font.info().clone());
                fonts.push(font);
            }
        }

        tracing::info!("Font cache initialized with {} fonts", fonts.len());

        Self {
            book: LazyHash::new(book),
            fonts,
        }
    }

    pub fn book(&self) -> &LazyHash<FontBook> {
        &self.book
    }

    pub fn font(&self, index: usize) -> Option<Font> {
        self.fonts.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Whether a family is available, case-insensitively
    pub fn has_family(&self, family: &str) -> bool {
        self.fonts
            .iter()
            .any(|font| font.info().family.eq_ignore_ascii_case(family))
    }
}

impl Default for FontCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_family_is_embedded() {
        let cache = global_font_cache();
        assert!(!cache.is_empty());
        assert!(cache.has_family(CERTIFICATE_FAMILY));
    }

    #[test]
    fn test_global_cache_singleton() {
        assert!(std::ptr::eq(global_font_cache(), global_font_cache()));
    }
}
