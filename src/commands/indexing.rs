//! Crawl start/stop and single-page indexing

use crate::config::{normalize_site_url, Config, SiteConfig};
use crate::crawl::{CrawlControl, PageFetcher, SiteCrawlReport, SiteCrawler};
use crate::error::{Error, Result};
use crate::index::IndexWriter;
use crate::lemma::Lemmatizer;
use crate::store::{IndexStore, SiteStatus};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;

/// Outcome of an indexing boundary call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingResponse {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexingResponse {
    pub fn ok() -> Self {
        Self {
            result: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            result: false,
            error: Some(message.into()),
        }
    }
}

/// Owns the crawl slot and the background crawl run
pub struct IndexingService {
    config: Config,
    writer: IndexWriter,
    control: Arc<CrawlControl>,
    workers: Arc<Semaphore>,
    run: Mutex<Option<JoinHandle<Vec<SiteCrawlReport>>>>,
}

impl IndexingService {
    pub fn new(config: Config, store: IndexStore) -> Self {
        let lemmatizer = Lemmatizer::new(config.lemmatizer.language);
        let workers = Arc::new(Semaphore::new(config.crawl.resolved_workers().max(1)));
        Self {
            writer: IndexWriter::new(store, lemmatizer),
            config,
            control: Arc::new(CrawlControl::new()),
            workers,
            run: Mutex::new(None),
        }
    }

    pub fn control(&self) -> Arc<CrawlControl> {
        Arc::clone(&self.control)
    }

    /// Start crawling every configured site
    pub async fn start_crawl(&self) -> IndexingResponse {
        self.start_crawl_sites(self.config.sites.clone()).await
    }

    /// Start crawling `sites` in the background
    ///
    /// Returns once every site is marked INDEXING; fails if a crawl is
    /// already running.
    pub async fn start_crawl_sites(&self, sites: Vec<SiteConfig>) -> IndexingResponse {
        if sites.is_empty() {
            return IndexingResponse::failed("No sites configured");
        }
        if !self.control.try_start() {
            return IndexingResponse::failed("Indexing is already running");
        }

        match self.launch(sites).await {
            Ok(handle) => {
                *self.run.lock().await = Some(handle);
                IndexingResponse::ok()
            }
            Err(e) => {
                error!("Failed to start indexing: {}", e);
                self.control.reset();
                IndexingResponse::failed(e.to_string())
            }
        }
    }

    async fn launch(&self, sites: Vec<SiteConfig>) -> Result<JoinHandle<Vec<SiteCrawlReport>>> {
        let fetcher = PageFetcher::new(&self.config.crawl)?;
        let store = self.writer.store();

        let mut prepared = Vec::with_capacity(sites.len());
        for site in &sites {
            let url = normalize_site_url(&site.url);
            match store.begin_site_run(&url, &site.name).await {
                Ok(row) => prepared.push(row),
                Err(e) => {
                    // No crawler will run for sites already marked INDEXING
                    let reason = e.to_string();
                    for row in &prepared {
                        if let Err(err) = store
                            .set_site_status(row.id, SiteStatus::Failed, Some(&reason))
                            .await
                        {
                            error!("Failed to record status of {}: {}", row.url, err);
                        }
                    }
                    return Err(e);
                }
            }
        }

        let crawlers: Vec<SiteCrawler> = prepared
            .into_iter()
            .map(|row| {
                SiteCrawler::new(
                    row,
                    self.config.crawl.clone(),
                    fetcher.clone(),
                    self.writer.clone(),
                    Arc::clone(&self.control),
                    Arc::clone(&self.workers),
                )
            })
            .collect();

        info!("Indexing started for {} sites", crawlers.len());
        let control = Arc::clone(&self.control);
        Ok(tokio::spawn(async move {
            let reports = join_all(crawlers.into_iter().map(SiteCrawler::run)).await;
            control.reset();
            info!("Indexing finished");
            reports
        }))
    }

    /// Signal the running crawl to stop; does not wait for it
    pub fn stop_crawl(&self) -> IndexingResponse {
        if !self.control.is_in_progress() {
            return IndexingResponse::failed("Indexing is not running");
        }
        info!("Stop requested");
        self.control.request_stop();
        IndexingResponse::ok()
    }

    /// Wait for the background crawl, if any, and return its site reports
    pub async fn wait_for_completion(&self) -> Vec<SiteCrawlReport> {
        let handle = self.run.lock().await.take();
        match handle {
            Some(handle) => match handle.await {
                Ok(reports) => reports,
                Err(e) => {
                    error!("Crawl run aborted: {}", e);
                    self.control.reset();
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Fetch and index one URL of a configured site
    pub async fn index_single_page(&self, url: &str) -> IndexingResponse {
        match self.try_index_single_page(url).await {
            Ok(()) => IndexingResponse::ok(),
            Err(e) => {
                warn!("Indexing {} failed: {}", url, e);
                IndexingResponse::failed(e.to_string())
            }
        }
    }

    async fn try_index_single_page(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url.trim())?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::InvalidInput(format!("Not an http(s) URL: {}", url)));
        }
        let url = parsed.as_str();

        let site_config = self.config.site_for_url(url).ok_or_else(|| {
            Error::InvalidInput(
                "This page is outside the sites listed in the configuration".to_string(),
            )
        })?;

        let site = self
            .writer
            .store()
            .ensure_site(
                &normalize_site_url(&site_config.url),
                &site_config.name,
                SiteStatus::Indexed,
            )
            .await?;

        let fetcher = PageFetcher::new(&self.config.crawl)?;
        let page = fetcher.fetch(url).await?;
        if page.is_error_status() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: page.status,
            });
        }
        if !page.is_indexable() {
            return Err(Error::UnsupportedContentType {
                url: url.to_string(),
                content_type: page.content_type.unwrap_or_default(),
            });
        }

        self.writer
            .index_page(&site, url, page.status, &page.body)
            .await?;
        self.writer.store().touch_site(site.id).await?;

        info!("Indexed single page {}", url);
        Ok(())
    }
}

/// Print an indexing response to console
pub fn print_indexing_response(action: &str, response: &IndexingResponse) {
    match &response.error {
        None => println!("✓ {}", action),
        Some(message) => println!("✗ {}: {}", action, message),
    }
}

/// Print per-site crawl outcomes to console
pub fn print_crawl_reports(reports: &[SiteCrawlReport]) {
    for report in reports {
        println!(
            "{} [{}] {} indexed, {} skipped",
            report.site_url, report.status, report.pages_indexed, report.pages_skipped
        );
        if let Some(error) = &report.error {
            println!("  error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(
            format!("<html><body>{}</body></html>", body).into_bytes(),
            "text/html",
        )
    }

    async fn setup_service(server: &MockServer) -> (IndexingService, IndexStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.sites.push(SiteConfig::new(server.uri(), "Mock"));
        config.crawl.request_delay_ms = 0;
        config.crawl.workers = 2;
        config.crawl.timeout_ms = 2_000;

        let store = IndexStore::open(&tmp.path().join("index.db")).await.unwrap();
        (IndexingService::new(config, store.clone()), store, tmp)
    }

    #[tokio::test]
    async fn test_concurrent_starts_admit_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html("<p>garden</p>"))
            .mount(&server)
            .await;

        let (service, _store, _tmp) = setup_service(&server).await;
        let (a, b) = tokio::join!(service.start_crawl(), service.start_crawl());
        assert_eq!([a.result, b.result].iter().filter(|r| **r).count(), 1);

        let reports = service.wait_for_completion().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, SiteStatus::Indexed);
        assert!(!service.control().is_in_progress());

        assert!(service.start_crawl().await.result);
        service.wait_for_completion().await;
    }

    #[tokio::test]
    async fn test_stop_without_crawl_fails() {
        let server = MockServer::start().await;
        let (service, _store, _tmp) = setup_service(&server).await;
        let response = service.stop_crawl();
        assert!(!response.result);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_stop_during_crawl_fails_sites() {
        let server = MockServer::start().await;
        let links: String = (0..20)
            .map(|i| format!(r#"<a href="/slow{}">s</a>"#, i))
            .collect();
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html(&links))
            .mount(&server)
            .await;
        for i in 0..20 {
            Mock::given(method("GET"))
                .and(path(format!("/slow{}", i)))
                .respond_with(html("<p>slow</p>").set_delay(std::time::Duration::from_millis(200)))
                .mount(&server)
                .await;
        }

        let (service, store, _tmp) = setup_service(&server).await;
        assert!(service.start_crawl().await.result);
        assert!(store.any_site_indexing().await.unwrap());

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(service.stop_crawl().result);
        let reports = service.wait_for_completion().await;

        assert_eq!(reports[0].status, SiteStatus::Failed);
        let sites = store.list_sites().await.unwrap();
        assert_eq!(sites[0].get_status().unwrap(), SiteStatus::Failed);
        assert_eq!(sites[0].last_error.as_deref(), Some(crate::crawl::STOPPED_BY_USER));
        assert!(!store.any_site_indexing().await.unwrap());
        assert!(store.frequency_mismatches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_page_indexing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(html("<p>garden flowers</p>"))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (service, store, _tmp) = setup_service(&server).await;

        let ok = service
            .index_single_page(&format!("{}/about", server.uri()))
            .await;
        assert_eq!(ok, IndexingResponse::ok());
        let site = store.find_site_by_url(&server.uri()).await.unwrap().unwrap();
        assert!(store.find_page(site.id, "/about").await.unwrap().is_some());

        let again = service
            .index_single_page(&format!("{}/about#team", server.uri()))
            .await;
        assert!(again.result);
        assert_eq!(store.count_pages(Some(site.id)).await.unwrap(), 1);
        assert_eq!(
            store.find_lemmas("garden", Some(site.id)).await.unwrap()[0].frequency,
            1
        );

        let missing = service
            .index_single_page(&format!("{}/gone", server.uri()))
            .await;
        assert!(!missing.result);
        assert!(missing.error.unwrap().contains("404"));

        let outside = service.index_single_page("https://elsewhere.org/page").await;
        assert!(!outside.result);

        let malformed = service.index_single_page("not a url").await;
        assert!(!malformed.result);
    }

    #[tokio::test]
    async fn test_failed_launch_releases_prepared_sites() {
        let server = MockServer::start().await;
        let (service, store, tmp) = setup_service(&server).await;

        let db = tmp.path().join("index.db");
        let pool = sqlx::SqlitePool::connect(&format!("sqlite://{}", db.display()))
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_site BEFORE INSERT ON sites WHEN NEW.url LIKE '%broken%' \
             BEGIN SELECT RAISE(ABORT, 'site rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let response = service
            .start_crawl_sites(vec![
                SiteConfig::new(server.uri(), "Mock"),
                SiteConfig::new("https://broken.example.com", "Broken"),
            ])
            .await;
        assert!(!response.result);
        assert!(!service.control().is_in_progress());

        let site = store.find_site_by_url(&server.uri()).await.unwrap().unwrap();
        assert_eq!(site.get_status().unwrap(), SiteStatus::Failed);
        assert!(site.last_error.unwrap().contains("site rejected"));
        assert!(!store.any_site_indexing().await.unwrap());
        assert!(service.wait_for_completion().await.is_empty());
    }
}
