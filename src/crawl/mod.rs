//! Site crawling
//!
//! This module provides:
//! - The process-wide crawl start/stop controller
//! - URL fetching with timeout retry and a fixed request delay
//! - Link discovery restricted to the site being crawled
//! - The per-site crawler driving a bounded fan-out of page tasks

mod control;
mod fetch;
mod links;

pub use control::*;
pub use fetch::*;
pub use links::*;

use crate::config::CrawlConfig;
use crate::error::{Error, Result};
use crate::index::IndexWriter;
use crate::store::{Site, SiteStatus};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Message stored on sites whose crawl was interrupted by a stop request
pub const STOPPED_BY_USER: &str = "Indexing stopped by user";

/// Outcome of one finished site crawl
#[derive(Debug, Clone, Serialize)]
pub struct SiteCrawlReport {
    pub site_url: String,
    pub status: SiteStatus,
    pub pages_indexed: u32,
    pub pages_skipped: u32,
    pub error: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct CrawlCounts {
    indexed: u32,
    skipped: u32,
}

/// Crawls one site from its root URL
#[derive(Clone)]
pub struct SiteCrawler {
    site: Site,
    config: CrawlConfig,
    fetcher: PageFetcher,
    writer: IndexWriter,
    control: Arc<CrawlControl>,
    workers: Arc<Semaphore>,
    visited: VisitedSet,
}

impl SiteCrawler {
    /// `site` must already be prepared for this run (status INDEXING)
    pub fn new(
        site: Site,
        config: CrawlConfig,
        fetcher: PageFetcher,
        writer: IndexWriter,
        control: Arc<CrawlControl>,
        workers: Arc<Semaphore>,
    ) -> Self {
        Self {
            site,
            config,
            fetcher,
            writer,
            control,
            workers,
            visited: VisitedSet::new(),
        }
    }

    /// Crawl the site to completion and record its terminal status
    pub async fn run(self) -> SiteCrawlReport {
        info!("Crawling site {} ({})", self.site.name, self.site.url);

        let result = self.crawl().await;
        let (status, counts, error) = match result {
            Ok(counts) if self.control.is_stop_requested() => {
                (SiteStatus::Failed, counts, Some(STOPPED_BY_USER.to_string()))
            }
            Ok(counts) => (SiteStatus::Indexed, counts, None),
            Err(Error::Cancelled) => (
                SiteStatus::Failed,
                CrawlCounts::default(),
                Some(STOPPED_BY_USER.to_string()),
            ),
            Err(e) => (SiteStatus::Failed, CrawlCounts::default(), Some(e.to_string())),
        };

        if let Err(e) = self
            .writer
            .store()
            .set_site_status(self.site.id, status, error.as_deref())
            .await
        {
            error!("Failed to record status of {}: {}", self.site.url, e);
        }

        match &error {
            None => info!(
                "Indexed {}: {} pages ({} skipped)",
                self.site.url, counts.indexed, counts.skipped
            ),
            Some(reason) => error!("Crawl of {} failed: {}", self.site.url, reason),
        }

        SiteCrawlReport {
            site_url: self.site.url.clone(),
            status,
            pages_indexed: counts.indexed,
            pages_skipped: counts.skipped,
            error,
        }
    }

    async fn crawl(&self) -> Result<CrawlCounts> {
        let root = self.site.url.clone();
        self.visited.insert_if_absent(&root).await;

        let per_site_tasks = self.config.resolved_workers().max(1);
        let max_pages = self.config.max_pages_per_site;

        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        queue.push_back((root, 0));
        let mut tasks: JoinSet<(String, u32, Result<Vec<String>>)> = JoinSet::new();
        let mut counts = CrawlCounts::default();

        loop {
            if self.control.is_stop_requested() {
                queue.clear();
                while tasks.join_next().await.is_some() {}
                return Err(Error::Cancelled);
            }

            while tasks.len() < per_site_tasks {
                let has_room = max_pages == 0 || counts.indexed + (tasks.len() as u32) < max_pages;
                if !has_room {
                    break;
                }
                let Some((url, depth)) = queue.pop_front() else {
                    break;
                };
                let crawler = self.clone();
                tasks.spawn(async move {
                    let result = crawler.process_page(&url, depth).await;
                    (url, depth, result)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (url, depth, result) = joined?;

            match result {
                Ok(links) => {
                    counts.indexed += 1;
                    queue.extend(links.into_iter().map(|link| (link, depth + 1)));
                }
                Err(Error::Cancelled) => {}
                Err(e) if depth == 0 => return Err(e),
                Err(e) => {
                    counts.skipped += 1;
                    warn!("Skipping {}: {}", url, e);
                }
            }
        }

        if max_pages > 0 && counts.indexed >= max_pages {
            info!("Reached max pages limit ({}) for {}", max_pages, self.site.url);
        }
        Ok(counts)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.control.is_stop_requested() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Fetch, index, and expand one URL; returns newly claimed links
    async fn process_page(&self, url: &str, depth: u32) -> Result<Vec<String>> {
        self.ensure_running()?;
        tokio::time::sleep(self.config.request_delay()).await;

        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| Error::Crawl("Worker pool closed".to_string()))?;
        self.ensure_running()?;

        let page = self.fetcher.fetch_with_retry(url, &self.control).await?;
        if page.is_error_status() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: page.status,
            });
        }
        if !page.is_indexable() {
            return Err(Error::UnsupportedContentType {
                url: url.to_string(),
                content_type: page.content_type.clone().unwrap_or_default(),
            });
        }

        self.ensure_running()?;
        self.writer
            .index_page(&self.site, url, page.status, &page.body)
            .await?;

        if let Err(e) = self.writer.store().touch_site(self.site.id).await {
            warn!("Failed to refresh status time of {}: {}", self.site.url, e);
        }

        if depth >= self.config.max_depth {
            return Ok(Vec::new());
        }

        let mut claimed = Vec::new();
        for link in discover_links(&page.body, url, &self.site.url) {
            if self.visited.insert_if_absent(&link).await {
                claimed.push(link);
            }
        }
        debug!("{} at depth {}: {} new links", url, depth, claimed.len());
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lemma::{Language, Lemmatizer};
    use crate::store::IndexStore;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn html_page(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(
            format!("<html><head><title>T</title></head><body>{}</body></html>", body)
                .into_bytes(),
            "text/html",
        )
    }

    async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn test_config() -> CrawlConfig {
        CrawlConfig {
            request_delay_ms: 0,
            retry_delay_ms: 10,
            timeout_ms: 2_000,
            workers: 4,
            ..CrawlConfig::default()
        }
    }

    async fn crawler_for(
        server: &MockServer,
        config: CrawlConfig,
        control: Arc<CrawlControl>,
    ) -> (SiteCrawler, IndexStore, TempDir) {
        crawler_for_site(&server.uri(), config, control).await
    }

    async fn crawler_for_site(
        site_url: &str,
        config: CrawlConfig,
        control: Arc<CrawlControl>,
    ) -> (SiteCrawler, IndexStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::open(&tmp.path().join("test.db")).await.unwrap();
        let site = store.begin_site_run(site_url, "Mock").await.unwrap();
        let writer = IndexWriter::new(store.clone(), Lemmatizer::new(Language::English));
        let fetcher = PageFetcher::new(&config).unwrap();
        let workers = Arc::new(Semaphore::new(config.resolved_workers()));
        let crawler = SiteCrawler::new(site, config, fetcher, writer, control, workers);
        (crawler, store, tmp)
    }

    #[tokio::test]
    async fn test_depth_bound_stops_expansion() {
        let server = MockServer::start().await;
        mount(&server, "/", html_page(r#"<p>garden root</p><a href="/a">A</a>"#)).await;
        mount(&server, "/a", html_page(r#"<p>garden child</p><a href="/b">B</a>"#)).await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(html_page("<p>too deep</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let config = CrawlConfig {
            max_depth: 1,
            ..test_config()
        };
        let control = Arc::new(CrawlControl::new());
        let (crawler, store, _tmp) = crawler_for(&server, config, control).await;
        let site_id = crawler.site.id;

        let report = crawler.run().await;
        assert_eq!(report.status, SiteStatus::Indexed);
        assert_eq!(report.pages_indexed, 2);

        assert!(store.find_page(site_id, "/").await.unwrap().is_some());
        assert!(store.find_page(site_id, "/a").await.unwrap().is_some());
        assert!(store.find_page(site_id, "/b").await.unwrap().is_none());
        let site = store.get_site(site_id).await.unwrap().unwrap();
        assert_eq!(site.get_status().unwrap(), SiteStatus::Indexed);
    }

    #[tokio::test]
    async fn test_each_url_fetched_once() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/",
            html_page(r#"<a href="/a">A</a><a href="/b">B</a><a href="/">Home</a>"#),
        )
        .await;
        for route in ["/a", "/b"] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(html_page(r#"<a href="/a">A</a><a href="/b/">B</a><a href="/">Home</a>"#))
                .expect(1)
                .mount(&server)
                .await;
        }

        let control = Arc::new(CrawlControl::new());
        let (crawler, store, _tmp) = crawler_for(&server, test_config(), control).await;
        let site_id = crawler.site.id;

        let report = crawler.run().await;
        assert_eq!(report.pages_indexed, 3);
        assert_eq!(store.count_pages(Some(site_id)).await.unwrap(), 3);
        assert!(store.frequency_mismatches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_root_failures_are_skipped() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/",
            html_page(r#"<a href="/missing">M</a><a href="/data.txt">D</a><a href="/feed">F</a>"#),
        )
        .await;
        mount(&server, "/missing", ResponseTemplate::new(404)).await;
        mount(
            &server,
            "/data.txt",
            ResponseTemplate::new(200).set_body_raw(b"plain garden text".to_vec(), "text/plain"),
        )
        .await;
        mount(
            &server,
            "/feed",
            ResponseTemplate::new(200).set_body_raw(b"{}".to_vec(), "application/json"),
        )
        .await;

        let control = Arc::new(CrawlControl::new());
        let (crawler, store, _tmp) = crawler_for(&server, test_config(), control).await;
        let site_id = crawler.site.id;

        let report = crawler.run().await;
        assert_eq!(report.status, SiteStatus::Indexed);
        assert_eq!(report.pages_indexed, 2);
        assert_eq!(report.pages_skipped, 2);
        assert!(store.find_page(site_id, "/missing").await.unwrap().is_none());
        assert!(store.find_page(site_id, "/feed").await.unwrap().is_none());
        assert!(store.find_page(site_id, "/data.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_root_failure_fails_site() {
        let server = MockServer::start().await;
        mount(&server, "/", ResponseTemplate::new(500)).await;

        let control = Arc::new(CrawlControl::new());
        let (crawler, store, _tmp) = crawler_for(&server, test_config(), control).await;
        let site_id = crawler.site.id;

        let report = crawler.run().await;
        assert_eq!(report.status, SiteStatus::Failed);

        let site = store.get_site(site_id).await.unwrap().unwrap();
        assert_eq!(site.get_status().unwrap(), SiteStatus::Failed);
        assert!(site.last_error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_max_pages_per_site() {
        let server = MockServer::start().await;
        let links: String = (0..6)
            .map(|i| format!(r#"<a href="/p{}">p</a>"#, i))
            .collect();
        mount(&server, "/", html_page(&links)).await;
        for i in 0..6 {
            mount(&server, &format!("/p{}", i), html_page("<p>leaf</p>")).await;
        }

        let config = CrawlConfig {
            max_pages_per_site: 3,
            workers: 1,
            ..test_config()
        };
        let control = Arc::new(CrawlControl::new());
        let (crawler, store, _tmp) = crawler_for(&server, config, control).await;
        let site_id = crawler.site.id;

        let report = crawler.run().await;
        assert_eq!(report.status, SiteStatus::Indexed);
        assert_eq!(store.count_pages(Some(site_id)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stop_marks_site_failed() {
        let server = MockServer::start().await;
        mount(&server, "/", html_page("<p>never fetched</p>")).await;

        let control = Arc::new(CrawlControl::new());
        assert!(control.try_start());
        control.request_stop();
        let (crawler, store, _tmp) = crawler_for(&server, test_config(), control).await;
        let site_id = crawler.site.id;

        let report = crawler.run().await;
        assert_eq!(report.status, SiteStatus::Failed);
        assert_eq!(report.error.as_deref(), Some(STOPPED_BY_USER));

        let site = store.get_site(site_id).await.unwrap().unwrap();
        assert_eq!(site.last_error.as_deref(), Some(STOPPED_BY_USER));
        assert_eq!(store.count_pages(Some(site_id)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mixed_case_site_url_follows_links() {
        let server = MockServer::start().await;
        mount(&server, "/", html_page(r#"<a href="/a">A</a>"#)).await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(html_page("<p>garden</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let site_url = format!("{}/", server.uri().replace("127.0.0.1", "LOCALHOST"));
        let control = Arc::new(CrawlControl::new());
        let (crawler, store, _tmp) = crawler_for_site(&site_url, test_config(), control).await;
        let site_id = crawler.site.id;

        let report = crawler.run().await;
        assert_eq!(report.status, SiteStatus::Indexed);
        assert_eq!(report.pages_indexed, 2);
        assert!(store.find_page(site_id, "/").await.unwrap().is_some());
        assert!(store.find_page(site_id, "/a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_failure_skips_page() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/",
            html_page(r#"<a href="/x">X</a><a href="/ok">OK</a><a href="/broken">B</a>"#),
        )
        .await;
        mount(&server, "/ok", html_page(r#"<p>garden</p><a href="/x/">X</a>"#)).await;
        mount(&server, "/broken", html_page("<p>garden</p>")).await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(html_page("<p>garden</p>"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/x/"))
            .respond_with(html_page("<p>garden</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let control = Arc::new(CrawlControl::new());
        let (crawler, store, tmp) = crawler_for(&server, test_config(), control).await;
        let site_id = crawler.site.id;

        let db = tmp.path().join("test.db");
        let pool = sqlx::SqlitePool::connect(&format!("sqlite://{}", db.display()))
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_page BEFORE INSERT ON pages WHEN NEW.path = '/broken' \
             BEGIN SELECT RAISE(ABORT, 'page rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = crawler.run().await;
        assert_eq!(report.status, SiteStatus::Indexed);
        assert_eq!(report.pages_indexed, 3);
        assert_eq!(report.pages_skipped, 1);

        assert_eq!(store.count_pages(Some(site_id)).await.unwrap(), 3);
        assert!(store.find_page(site_id, "/broken").await.unwrap().is_none());
        assert!(store.find_page(site_id, "/x").await.unwrap().is_some());
        assert_eq!(
            store.find_lemmas("garden", Some(site_id)).await.unwrap()[0].frequency,
            2
        );
        assert!(store.frequency_mismatches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_delay_does_not_hold_worker() {
        let server = MockServer::start().await;
        mount(&server, "/", html_page("<p>garden</p>")).await;

        let config = CrawlConfig {
            request_delay_ms: 400,
            workers: 1,
            ..test_config()
        };
        let control = Arc::new(CrawlControl::new());
        let (crawler, _store, _tmp) = crawler_for(&server, config, control).await;
        let workers = Arc::clone(&crawler.workers);

        let run = tokio::spawn(crawler.run());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(workers.available_permits(), 1);

        let report = run.await.unwrap();
        assert_eq!(report.status, SiteStatus::Indexed);
        assert_eq!(report.pages_indexed, 1);
    }
}
