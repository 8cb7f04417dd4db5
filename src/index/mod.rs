//! Index writer
//!
//! Turns a fetched page into stored state: the site-relative path, the page
//! row, and one index entry per content lemma. Re-indexing a path replaces
//! the previous page in the same transaction.

use crate::config::{normalize_site_url, url_belongs_to_site};
use crate::crawl::normalize_url;
use crate::error::{Error, Result};
use crate::lemma::Lemmatizer;
use crate::parse::extract_text;
use crate::store::{IndexStore, Site};
use tracing::debug;

/// Writes pages and their lemma index into the store
#[derive(Clone)]
pub struct IndexWriter {
    store: IndexStore,
    lemmatizer: Lemmatizer,
}

impl IndexWriter {
    pub fn new(store: IndexStore, lemmatizer: Lemmatizer) -> Self {
        Self { store, lemmatizer }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Index one fetched page, replacing any page already stored at its path
    ///
    /// Returns the new page id.
    pub async fn index_page(
        &self,
        site: &Site,
        url: &str,
        http_code: u16,
        html: &str,
    ) -> Result<i64> {
        let path = site_relative_path(&site.url, url)?;
        let text = extract_text(html);
        let lemmas = self.lemmatizer.extract_lemmas(&text);

        debug!("{} -> {} ({} distinct lemmas)", url, path, lemmas.len());

        self.store
            .replace_page(site.id, &path, http_code, html, &lemmas)
            .await
    }

    /// Delete the page stored for `url`, if any
    pub async fn delete_page(&self, site: &Site, url: &str) -> Result<bool> {
        let path = site_relative_path(&site.url, url)?;
        match self.store.find_page(site.id, &path).await? {
            Some(page) => {
                self.store.delete_page(&page).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every page, lemma, and index entry of a site
    pub async fn delete_site_data(&self, site: &Site) -> Result<()> {
        self.store.delete_site_data(site.id).await
    }
}

/// Path of `url` relative to `site_url`, `/` for the site root
///
/// The URL is canonicalized the same way the crawler dedups it: no fragment,
/// no trailing slash, query kept. `/about`, `/about/` and `/about#team`
/// therefore share one page row.
pub fn site_relative_path(site_url: &str, url: &str) -> Result<String> {
    let site_url = normalize_site_url(site_url);
    let url = normalize_url(url.trim());
    if !url_belongs_to_site(&site_url, &url) {
        return Err(Error::InvalidInput(format!(
            "{} does not belong to site {}",
            url, site_url
        )));
    }

    let rest = &url[site_url.len()..];
    let path = if rest.is_empty() {
        "/".to_string()
    } else if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    };
    Ok(path)
}
