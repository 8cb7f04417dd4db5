//! HTTP page fetching with timeout retry

use super::CrawlControl;
use crate::config::CrawlConfig;
use crate::error::{Error, Result};
use crate::parse::is_indexable_content_type;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, REFERER};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One HTTP response, body read only for indexable content types
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    pub fn is_error_status(&self) -> bool {
        self.status >= 400
    }

    pub fn is_indexable(&self) -> bool {
        is_indexable_content_type(self.content_type.as_deref())
    }
}

/// HTTP client configured for crawling
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl PageFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.referrer.is_empty() {
            let referrer = HeaderValue::from_str(&config.referrer)
                .map_err(|e| Error::Config(format!("Invalid referrer '{}': {}", config.referrer, e)))?;
            headers.insert(REFERER, referrer);
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Crawl(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// Issue a single GET
    ///
    /// The content type is checked before the body is read; bodies of
    /// non-indexable responses are left unread.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let started = Instant::now();
        let response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = if is_indexable_content_type(content_type.as_deref()) {
            response.text().await?
        } else {
            String::new()
        };

        debug!(
            "GET {} -> {} in {}ms",
            url,
            status,
            started.elapsed().as_millis()
        );

        Ok(FetchedPage {
            url: url.to_string(),
            status,
            content_type,
            body,
        })
    }

    /// GET with up to `max_attempts` tries on timeout
    ///
    /// Non-timeout errors return immediately. A stop request observed between
    /// attempts yields `Error::Cancelled`.
    pub async fn fetch_with_retry(&self, url: &str, control: &CrawlControl) -> Result<FetchedPage> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch(url).await {
                Ok(page) => return Ok(page),
                Err(Error::Http(e)) if e.is_timeout() => {
                    if attempt >= self.max_attempts {
                        return Err(Error::FetchTimeout {
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(
                        "Timeout fetching {} (attempt {}/{}), retrying",
                        url, attempt, self.max_attempts
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    if control.is_stop_requested() {
                        return Err(Error::Cancelled);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
