//! Image reference extraction from HTML.

use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::naming::original_filename;

/// A fetched HTML page.
#[derive(Debug, Clone)]
pub struct PageDocument {
    pub url: Url,
    pub html: String,
}

impl PageDocument {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
        }
    }

    /// Build from raw response bytes. Invalid UTF-8 sequences are replaced.
    pub fn from_bytes(url: Url, bytes: &[u8]) -> Self {
        Self::new(url, String::from_utf8_lossy(bytes))
    }
}

/// An image reference discovered on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    /// Absolute URL of the image.
    pub url: Url,
    /// Last path segment of the URL, percent-decoded.
    pub original_filename: String,
}

impl ImageCandidate {
    pub fn new(url: Url) -> Self {
        let original_filename = original_filename(&url);
        Self {
            url,
            original_filename,
        }
    }
}

/// Finds `<img>` references and resolves them to absolute URLs.
pub struct ImageExtractor {
    img_selector: Selector,
    base_selector: Selector,
    /// Lazy-load attributes, consulted before `src`.
    lazy_attributes: Vec<String>,
    /// Lowercase extensions with leading dot; empty accepts all.
    allowed_extensions: Vec<String>,
}

impl ImageExtractor {
    pub fn new(lazy_attributes: &[String], allowed_extensions: &[String]) -> Self {
        let lazy_attributes = lazy_attributes
            .iter()
            .filter(|attr| attr.as_str() != "src")
            .cloned()
            .collect();

        let allowed_extensions = allowed_extensions
            .iter()
            .map(|ext| {
                let ext = ext.trim().to_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();

        Self {
            img_selector: Selector::parse("img").expect("static selector"),
            base_selector: Selector::parse("base[href]").expect("static selector"),
            lazy_attributes,
            allowed_extensions,
        }
    }

    /// Extract distinct image candidates in first-seen document order.
    pub fn extract(&self, page: &PageDocument) -> Vec<ImageCandidate> {
        let document = Html::parse_document(&page.html);
        let base = self.base_url(&document, &page.url);

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for element in document.select(&self.img_selector) {
            let Some(url) = self.element_url(element.value(), &base) else {
                continue;
            };
            if !self.extension_allowed(&url) {
                debug!("skipping {} (extension not allowed)", url);
                continue;
            }
            if seen.insert(url.as_str().to_string()) {
                candidates.push(ImageCandidate::new(url));
            }
        }

        candidates
    }

    /// The image an `<img>` really shows. A lazy-load attribute wins over
    /// `src`, which on such pages is usually a placeholder.
    fn element_url(&self, element: &scraper::node::Element, base: &Url) -> Option<Url> {
        let lazy = self.lazy_attributes.iter().map(String::as_str);
        for attr in lazy.chain(std::iter::once("src")) {
            let Some(reference) = element.attr(attr) else {
                continue;
            };
            match resolve_reference(base, reference) {
                Some(url) => return Some(url),
                None => debug!("skipping unusable image reference {:?}", reference),
            }
        }
        None
    }

    /// Page URL, or the document's `<base href>` resolved against it.
    fn base_url(&self, document: &Html, page_url: &Url) -> Url {
        document
            .select(&self.base_selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| page_url.join(href.trim()).ok())
            .unwrap_or_else(|| page_url.clone())
    }

    fn extension_allowed(&self, url: &Url) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        let path = url.path().to_lowercase();
        self.allowed_extensions.iter().any(|ext| path.ends_with(ext))
    }
}

/// Resolve an attribute value to an absolute http(s) URL.
///
/// Fragments are dropped so `a.jpg#x` and `a.jpg` are one image.
fn resolve_reference(base: &Url, reference: &str) -> Option<Url> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with("data:") {
        return None;
    }
    let mut url = base.join(reference).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ImageExtractor {
        ImageExtractor::new(&["data-src".to_string()], &[])
    }

    fn page(html: &str) -> PageDocument {
        PageDocument::new(Url::parse("https://blog.example.jp/archives/1.html").unwrap(), html)
    }

    fn urls(candidates: &[ImageCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.url.as_str()).collect()
    }

    #[test]
    fn test_resolves_relative_and_dedups_in_order() {
        let html = r#"
            <html><body>
              <img src="/img/a.jpg">
              <img src="https://cdn.example.jp/b.png">
              <img src="../img/a.jpg">
              <p><img src="c.gif"></p>
              <img src="https://cdn.example.jp/b.png">
            </body></html>
        "#;
        let candidates = extractor().extract(&page(html));
        assert_eq!(
            urls(&candidates),
            vec![
                "https://blog.example.jp/img/a.jpg",
                "https://cdn.example.jp/b.png",
                "https://blog.example.jp/archives/c.gif",
            ]
        );
        assert_eq!(candidates[1].original_filename, "b.png");
    }

    #[test]
    fn test_lazy_load_attribute_replaces_placeholder_src() {
        let html = r#"<img src="/spacer.gif" data-src="/photos/real.jpg"><img data-src="/photos/other.jpg">"#;
        let candidates = extractor().extract(&page(html));
        assert_eq!(
            urls(&candidates),
            vec![
                "https://blog.example.jp/photos/real.jpg",
                "https://blog.example.jp/photos/other.jpg",
            ]
        );
    }

    #[test]
    fn test_falls_back_to_src_when_lazy_value_unusable() {
        let html = r#"<img src="/photos/a.jpg" data-src=""><img src="/photos/b.jpg">"#;
        let candidates = extractor().extract(&page(html));
        assert_eq!(
            urls(&candidates),
            vec![
                "https://blog.example.jp/photos/a.jpg",
                "https://blog.example.jp/photos/b.jpg",
            ]
        );
    }

    #[test]
    fn test_skips_unusable_references() {
        let html = r#"
            <img src="">
            <img src="data:image/gif;base64,R0lGODlhAQABAAAAACw=">
            <img src="javascript:void(0)">
            <img src="http://[::1">
            <img alt="no source">
            <img src="/ok.jpg">
        "#;
        let candidates = extractor().extract(&page(html));
        assert_eq!(urls(&candidates), vec!["https://blog.example.jp/ok.jpg"]);
    }

    #[test]
    fn test_fragment_variants_are_one_candidate() {
        let html = r#"<img src="/a.jpg#top"><img src="/a.jpg">"#;
        let candidates = extractor().extract(&page(html));
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_honours_base_href() {
        let html = r#"<head><base href="https://static.example.jp/assets/"></head><img src="x.jpg">"#;
        let candidates = extractor().extract(&page(html));
        assert_eq!(urls(&candidates), vec!["https://static.example.jp/assets/x.jpg"]);
    }

    #[test]
    fn test_allowed_extensions() {
        let extractor = ImageExtractor::new(&[], &["jpg".to_string(), ".PNG".to_string()]);
        let html = r#"<img src="/a.JPG"><img src="/b.svg"><img src="/c.png?w=300"><img src="/d">"#;
        let candidates = extractor.extract(&page(html));
        assert_eq!(
            urls(&candidates),
            vec![
                "https://blog.example.jp/a.JPG",
                "https://blog.example.jp/c.png?w=300",
            ]
        );
    }

    #[test]
    fn test_empty_page() {
        assert!(extractor().extract(&page("")).is_empty());
    }
}
