//! HTML parsing and text extraction

use super::normalize_whitespace;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Elements whose text never reaches the reader
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Everything the crawler and search need from one HTML document
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Contents of `<title>`, if any
    pub title: Option<String>,

    /// Visible body text, whitespace-collapsed
    pub text: String,

    /// Absolute http(s) targets of every `a[href]`, in document order
    pub links: Vec<String>,
}

/// Parse HTML content once and extract title, text, and links
pub fn parse_html(content: &str, base_url: Option<&str>) -> ParsedPage {
    let document = Html::parse_document(content);
    ParsedPage {
        title: title_of(&document),
        text: visible_text_of(&document),
        links: links_of(&document, base_url),
    }
}

/// Extract the visible text of an HTML document
pub fn extract_text(content: &str) -> String {
    visible_text_of(&Html::parse_document(content))
}

/// Extract the `<title>` of an HTML document
pub fn extract_title(content: &str) -> Option<String> {
    title_of(&Html::parse_document(content))
}

fn title_of(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|elem| normalize_whitespace(&elem.text().collect::<String>()))
        .filter(|title| !title.is_empty())
}

fn visible_text_of(document: &Html) -> String {
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next());
    let root: ElementRef<'_> = body.unwrap_or_else(|| document.root_element());

    let mut text = String::new();
    for node in root.descendants() {
        let Node::Text(fragment) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|elem| HIDDEN_ELEMENTS.contains(&elem.name()))
                .unwrap_or(false)
        });
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }

    normalize_whitespace(&text)
}

fn links_of(document: &Html, base_url: Option<&str>) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let base = base_url.and_then(|u| Url::parse(u).ok());

    document
        .select(&selector)
        .filter_map(|elem| elem.value().attr("href"))
        .filter_map(|href| {
            let href = href.trim();
            let resolved = match &base {
                Some(base) => base.join(href).ok()?,
                None => Url::parse(href).ok()?,
            };
            matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
        })
        .collect()
}
