//! Page parsing and text extraction
//!
//! This module handles:
//! - Visible text extraction from HTML
//! - Title and anchor extraction
//! - Content type screening of fetched responses

mod html;

pub use html::*;

/// Whether a response with this `Content-Type` may be parsed and indexed
///
/// Any `text/*` type and any XML flavour qualifies; a missing header does not.
pub fn is_indexable_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let lower = ct.trim().to_lowercase();
            lower.starts_with("text/") || lower.contains("xml")
        }
        None => false,
    }
}

/// Collapse every run of whitespace into a single space
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexable_content_types() {
        assert!(is_indexable_content_type(Some("text/html; charset=utf-8")));
        assert!(is_indexable_content_type(Some("text/plain")));
        assert!(is_indexable_content_type(Some("application/xhtml+xml")));
        assert!(is_indexable_content_type(Some("application/rss+xml")));
        assert!(!is_indexable_content_type(Some("image/png")));
        assert!(!is_indexable_content_type(Some("application/pdf")));
        assert!(!is_indexable_content_type(None));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  Hello \n\n  world\t!  "), "Hello world !");
        assert_eq!(normalize_whitespace(""), "");
    }
}
