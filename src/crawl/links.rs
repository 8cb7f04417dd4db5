//! Link discovery and per-run URL dedup

use crate::config::{normalize_site_url, url_belongs_to_site};
use crate::parse::parse_html;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

/// Server-side page extensions that render HTML despite their guessed MIME type
const DYNAMIC_PAGE_EXTENSIONS: &[&str] = &["php", "asp", "aspx", "jsp", "cgi", "pl", "cfm"];

/// URLs already claimed during one crawl run
#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `url`; false if it was already claimed
    pub async fn insert_if_absent(&self, url: &str) -> bool {
        let key = normalize_url(url);
        {
            let visited = self.inner.read().await;
            if visited.contains(&key) {
                return false;
            }
        }
        let mut visited = self.inner.write().await;
        visited.insert(key)
    }
}

/// Normalize a URL for deduplication
pub fn normalize_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    parsed.set_fragment(None);

    let path = parsed.path().trim_end_matches('/').to_string();
    if path.is_empty() {
        parsed.set_path("/");
    } else {
        parsed.set_path(&path);
    }
    parsed.to_string()
}

/// Whether a link target is clearly not an HTML page, judged by extension
pub fn has_non_html_extension(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(last) = parsed.path_segments().and_then(|mut s| s.next_back()) else {
        return false;
    };
    let Some((_, ext)) = last.rsplit_once('.') else {
        return false;
    };
    let ext = ext.to_lowercase();
    if DYNAMIC_PAGE_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }

    match mime_guess::from_ext(&ext).first() {
        Some(mime) => {
            let essence = mime.essence_str();
            !(essence == "text/html" || essence == "text/plain" || essence.contains("xml"))
        }
        None => false,
    }
}

/// Whether the crawler may follow `url` within the site rooted at `site_url`
pub fn should_follow(site_url: &str, url: &str) -> bool {
    url_belongs_to_site(&normalize_site_url(site_url), url)
        && !url.contains('#')
        && !has_non_html_extension(url)
}

/// Followable links of a page, deduplicated, in document order
pub fn discover_links(html: &str, page_url: &str, site_url: &str) -> Vec<String> {
    let parsed = parse_html(html, Some(page_url));
    let mut seen = HashSet::new();
    parsed
        .links
        .into_iter()
        .filter(|link| should_follow(site_url, link))
        .filter(|link| seen.insert(normalize_url(link)))
        .collect()
}
