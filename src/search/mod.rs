//! Ranked full-text search over the lemma index
//!
//! A query is lemmatized, over-common lemmas are dropped on large scopes,
//! candidate pages are intersected rarest lemma first, and each surviving
//! page is scored by its summed ranks normalized to the best page.

mod snippet;

pub use snippet::*;

use crate::config::{normalize_site_url, SearchConfig};
use crate::error::{Error, Result};
use crate::lemma::Lemmatizer;
use crate::parse::{extract_text, extract_title};
use crate::store::IndexStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// One ranked page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub site: String,
    pub site_name: String,
    pub path: String,
    pub title: String,
    pub snippet: String,
    pub relevance: f64,
}

/// A page of results plus the size of the whole result set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPage {
    pub total_count: usize,
    pub results: Vec<SearchHit>,
}

/// A query lemma resolved against the index
#[derive(Debug, Clone)]
struct QueryTerm {
    lemma: String,
    frequency: i64,
    lemma_ids: Vec<i64>,
}

/// Search engine over an index store
#[derive(Clone)]
pub struct SearchEngine {
    store: IndexStore,
    lemmatizer: Lemmatizer,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(store: IndexStore, lemmatizer: Lemmatizer, config: SearchConfig) -> Self {
        Self {
            store,
            lemmatizer,
            config,
        }
    }

    /// Run a query, optionally scoped to one site URL
    ///
    /// Fails on a blank query or an unknown site. Queries with no indexed or
    /// no discriminating lemmas yield an empty page.
    pub async fn search(
        &self,
        query: &str,
        site_url: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("Empty search query".to_string()));
        }

        let site_id = match site_url {
            Some(url) => {
                let url = normalize_site_url(url);
                let site = self
                    .store
                    .find_site_by_url(&url)
                    .await?
                    .ok_or_else(|| Error::SiteNotFound(url.clone()))?;
                Some(site.id)
            }
            None => None,
        };

        let query_lemmas = self.lemmatizer.query_lemmas(query);
        if query_lemmas.is_empty() {
            return Ok(SearchPage::default());
        }

        let Some(terms) = self.resolve_terms(&query_lemmas, site_id).await? else {
            return Ok(SearchPage::default());
        };

        let total_pages = self.store.count_pages(site_id).await?;
        let mut terms = self.filter_common(terms, total_pages);
        if terms.is_empty() {
            debug!("All query lemmas filtered as too common");
            return Ok(SearchPage::default());
        }
        terms.sort_by(|a, b| {
            a.frequency
                .cmp(&b.frequency)
                .then_with(|| a.lemma.cmp(&b.lemma))
        });

        let candidates = self.intersect_pages(&terms).await?;
        if candidates.is_empty() {
            return Ok(SearchPage::default());
        }

        let lemma_ids: Vec<i64> = terms
            .iter()
            .flat_map(|t| t.lemma_ids.iter().copied())
            .collect();
        let ranks = self.store.summed_ranks(&candidates, &lemma_ids).await?;

        let mut scored: Vec<(i64, f64)> = candidates
            .iter()
            .map(|id| (*id, ranks.get(id).copied().unwrap_or(0) as f64))
            .collect();
        let max = scored.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
        if max > 0.0 {
            for (_, score) in &mut scored {
                *score /= max;
            }
        }
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let total_count = scored.len();
        let surviving: BTreeSet<String> = terms.into_iter().map(|t| t.lemma).collect();
        let mut results = Vec::new();
        for (page_id, relevance) in scored.into_iter().skip(offset).take(limit) {
            if let Some(hit) = self.build_hit(page_id, relevance, &surviving).await? {
                results.push(hit);
            }
        }

        Ok(SearchPage {
            total_count,
            results,
        })
    }

    /// Look up every query lemma; `None` if any has no rows in scope
    async fn resolve_terms(
        &self,
        query_lemmas: &BTreeSet<String>,
        site_id: Option<i64>,
    ) -> Result<Option<Vec<QueryTerm>>> {
        let mut terms = Vec::with_capacity(query_lemmas.len());
        for lemma in query_lemmas {
            let rows = self.store.find_lemmas(lemma, site_id).await?;
            if rows.is_empty() {
                debug!("Query lemma '{}' not indexed", lemma);
                return Ok(None);
            }
            terms.push(QueryTerm {
                lemma: lemma.clone(),
                frequency: rows.iter().map(|r| r.frequency).sum(),
                lemma_ids: rows.iter().map(|r| r.id).collect(),
            });
        }
        Ok(Some(terms))
    }

    /// Drop lemmas present on nearly every page of a large scope
    fn filter_common(&self, terms: Vec<QueryTerm>, total_pages: u64) -> Vec<QueryTerm> {
        if total_pages < self.config.small_site_threshold {
            return terms;
        }
        terms
            .into_iter()
            .filter(|term| {
                let ratio = term.frequency as f64 / total_pages as f64;
                let keep = ratio <= self.config.common_lemma_ratio;
                if !keep {
                    debug!("Dropping common lemma '{}' ({:.3})", term.lemma, ratio);
                }
                keep
            })
            .collect()
    }

    /// Pages indexed under every term, narrowed rarest first
    async fn intersect_pages(&self, terms: &[QueryTerm]) -> Result<Vec<i64>> {
        let mut candidates = self.store.page_ids_for_lemmas(&terms[0].lemma_ids).await?;
        for term in &terms[1..] {
            if candidates.is_empty() {
                break;
            }
            let pages: HashSet<i64> = self
                .store
                .page_ids_for_lemmas(&term.lemma_ids)
                .await?
                .into_iter()
                .collect();
            candidates.retain(|id| pages.contains(id));
        }
        Ok(candidates)
    }

    async fn build_hit(
        &self,
        page_id: i64,
        relevance: f64,
        lemmas: &BTreeSet<String>,
    ) -> Result<Option<SearchHit>> {
        let Some(page) = self.store.get_page_with_site(page_id).await? else {
            return Ok(None);
        };

        let options = SnippetOptions {
            max_chars: self.config.snippet_max_chars,
            context_words: self.config.snippet_context_words,
        };
        let text = extract_text(&page.content);

        Ok(Some(SearchHit {
            site: page.site_url,
            site_name: page.site_name,
            path: page.path,
            title: extract_title(&page.content).unwrap_or_default(),
            snippet: build_snippet(&text, lemmas, &self.lemmatizer, options),
            relevance,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lemma::Language;
    use crate::store::Site;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    async fn setup_engine(config: SearchConfig) -> (SearchEngine, IndexStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::open(&tmp.path().join("test.db")).await.unwrap();
        let engine = SearchEngine::new(
            store.clone(),
            Lemmatizer::new(Language::English),
            config,
        );
        (engine, store, tmp)
    }

    async fn add_page(store: &IndexStore, site: &Site, path: &str, body: &str, lemmas: &[(&str, u32)]) {
        let html = format!(
            "<html><head><title>{}</title></head><body><p>{}</p></body></html>",
            path, body
        );
        let map: BTreeMap<String, u32> = lemmas.iter().map(|(l, n)| (l.to_string(), *n)).collect();
        store
            .replace_page(site.id, path, 200, &html, &map)
            .await
            .unwrap();
    }

    async fn cat_dog_fixture() -> (SearchEngine, IndexStore, TempDir) {
        let (engine, store, tmp) = setup_engine(SearchConfig::default()).await;
        let site = store
            .begin_site_run("https://example.com", "Example")
            .await
            .unwrap();
        add_page(&store, &site, "/p1", "cat cat cat cat cat", &[("cat", 5)]).await;
        add_page(&store, &site, "/p2", "cat dog dog dog", &[("cat", 1), ("dog", 3)]).await;
        (engine, store, tmp)
    }

    #[tokio::test]
    async fn test_relevance_is_normalized() {
        let (engine, _store, _tmp) = cat_dog_fixture().await;

        let page = engine.search("cat", None, 0, 10).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.results[0].path, "/p1");
        assert!((page.results[0].relevance - 1.0).abs() < 1e-9);
        assert_eq!(page.results[1].path, "/p2");
        assert!((page.results[1].relevance - 0.2).abs() < 1e-9);
        assert_eq!(page.results[0].title, "/p1");
        assert_eq!(page.results[0].site_name, "Example");
        assert!(page.results[1].snippet.contains("<b>cat</b>"));
    }

    #[tokio::test]
    async fn test_all_lemmas_must_match() {
        let (engine, _store, _tmp) = cat_dog_fixture().await;

        let page = engine.search("cat dog", None, 0, 10).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.results[0].path, "/p2");
        assert!((page.results[0].relevance - 1.0).abs() < 1e-9);

        let page = engine.search("cat unicorn", None, 0, 10).await.unwrap();
        assert_eq!(page.total_count, 0);
    }

    #[tokio::test]
    async fn test_blank_query_fails() {
        let (engine, _store, _tmp) = cat_dog_fixture().await;
        assert!(matches!(
            engine.search("   ", None, 0, 10).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_site_scope_fails() {
        let (engine, _store, _tmp) = cat_dog_fixture().await;
        assert!(matches!(
            engine.search("cat", Some("https://nowhere.org"), 0, 10).await,
            Err(Error::SiteNotFound(_))
        ));

        let page = engine
            .search("cat", Some("https://example.com/"), 0, 10)
            .await
            .unwrap();
        assert_eq!(page.total_count, 2);
    }

    #[tokio::test]
    async fn test_pagination() {
        let (engine, _store, _tmp) = cat_dog_fixture().await;

        let page = engine.search("cat", None, 1, 10).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].path, "/p2");

        let page = engine.search("cat", None, 5, 10).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert!(page.results.is_empty());
    }

    #[tokio::test]
    async fn test_common_lemmas_filtered_on_large_scope() {
        let config = SearchConfig {
            small_site_threshold: 3,
            common_lemma_ratio: 0.5,
            ..SearchConfig::default()
        };
        let (engine, store, _tmp) = setup_engine(config).await;
        let site = store
            .begin_site_run("https://example.com", "Example")
            .await
            .unwrap();
        add_page(&store, &site, "/a", "garden tree", &[("garden", 1), ("tree", 1)]).await;
        add_page(&store, &site, "/b", "garden", &[("garden", 2)]).await;
        add_page(&store, &site, "/c", "garden", &[("garden", 1)]).await;

        let page = engine.search("garden", None, 0, 10).await.unwrap();
        assert_eq!(page.total_count, 0);

        let page = engine.search("garden tree", None, 0, 10).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.results[0].path, "/a");
    }

    #[tokio::test]
    async fn test_small_scope_skips_filtering() {
        let config = SearchConfig {
            small_site_threshold: 10,
            common_lemma_ratio: 0.5,
            ..SearchConfig::default()
        };
        let (engine, store, _tmp) = setup_engine(config).await;
        let site = store
            .begin_site_run("https://example.com", "Example")
            .await
            .unwrap();
        add_page(&store, &site, "/a", "garden", &[("garden", 1)]).await;
        add_page(&store, &site, "/b", "garden", &[("garden", 1)]).await;

        let page = engine.search("garden", None, 0, 10).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.results[0].path, "/a");
    }

    #[tokio::test]
    async fn test_cross_site_search() {
        let (engine, store, _tmp) = setup_engine(SearchConfig::default()).await;
        let a = store.begin_site_run("https://a.com", "A").await.unwrap();
        let b = store.begin_site_run("https://b.com", "B").await.unwrap();
        add_page(&store, &a, "/", "garden", &[("garden", 1)]).await;
        add_page(&store, &b, "/", "garden garden", &[("garden", 2)]).await;

        let page = engine.search("gardens", None, 0, 10).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.results[0].site, "https://b.com");
        assert_eq!(page.results[1].site, "https://a.com");

        let page = engine.search("garden", Some("https://a.com"), 0, 10).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.results[0].site_name, "A");
    }
}
