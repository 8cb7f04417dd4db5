//! Configuration management for sitesearch
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::lemma::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Environment variable overriding the database location
pub const DB_PATH_ENV: &str = "SITESEARCH_DB";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sites to crawl
    #[serde(default)]
    pub sites: Vec<SiteConfig>,

    /// Web crawling configuration
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Lemmatizer configuration
    #[serde(default)]
    pub lemmatizer: LemmatizerConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// A configured site: plain value, passed around by clone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Root URL of the site (no trailing slash after validation)
    pub url: String,

    /// Human-readable site name
    pub name: String,
}

impl SiteConfig {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }
}

/// Web crawling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// User agent string
    #[serde(default = "default_crawl_user_agent")]
    pub user_agent: String,

    /// Referer header sent with every request
    #[serde(default = "default_crawl_referrer")]
    pub referrer: String,

    /// Pause before each request of a crawl task (milliseconds)
    #[serde(default = "default_crawl_request_delay")]
    pub request_delay_ms: u64,

    /// Maximum link hops from the site root
    #[serde(default = "default_crawl_max_depth")]
    pub max_depth: u32,

    /// Maximum pages indexed per site per run (0 = unlimited)
    #[serde(default = "default_crawl_max_pages")]
    pub max_pages_per_site: u32,

    /// Fetch attempts per URL when the request times out
    #[serde(default = "default_crawl_max_attempts")]
    pub max_attempts: u32,

    /// Pause before retrying a timed out request (milliseconds)
    #[serde(default = "default_crawl_retry_delay")]
    pub retry_delay_ms: u64,

    /// Request timeout (milliseconds)
    #[serde(default = "default_crawl_timeout")]
    pub timeout_ms: u64,

    /// Worker pool size (0 = available parallelism)
    #[serde(default = "default_crawl_workers")]
    pub workers: usize,
}

impl CrawlConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Effective worker pool size
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Below this page count no lemma is considered too common
    #[serde(default = "default_search_small_site_threshold")]
    pub small_site_threshold: u64,

    /// Maximum share of pages a query lemma may appear on (0.0 - 1.0]
    #[serde(default = "default_search_common_lemma_ratio")]
    pub common_lemma_ratio: f64,

    /// Default number of results per page
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Maximum snippet length in characters
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,

    /// Words kept on each side of a highlighted match run
    #[serde(default = "default_snippet_context_words")]
    pub snippet_context_words: usize,
}

/// Lemmatizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LemmatizerConfig {
    /// Language of the indexed sites
    #[serde(default = "default_lemmatizer_language")]
    pub language: Language,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for sitesearch data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            crawl: CrawlConfig::default(),
            search: SearchConfig::default(),
            lemmatizer: LemmatizerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: default_crawl_user_agent(),
            referrer: default_crawl_referrer(),
            request_delay_ms: default_crawl_request_delay(),
            max_depth: default_crawl_max_depth(),
            max_pages_per_site: default_crawl_max_pages(),
            max_attempts: default_crawl_max_attempts(),
            retry_delay_ms: default_crawl_retry_delay(),
            timeout_ms: default_crawl_timeout(),
            workers: default_crawl_workers(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            small_site_threshold: default_search_small_site_threshold(),
            common_lemma_ratio: default_search_common_lemma_ratio(),
            default_limit: default_search_limit(),
            snippet_max_chars: default_snippet_max_chars(),
            snippet_context_words: default_snippet_context_words(),
        }
    }
}

impl Default for LemmatizerConfig {
    fn default() -> Self {
        Self {
            language: default_lemmatizer_language(),
        }
    }
}

impl Config {
    /// Get the default base directory for sitesearch (~/.sitesearch)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sitesearch")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: db_path_for(&base),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: db_path_for(&base),
            base_dir: base,
        };

        config.validate()?;
        config.normalize_sites();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Strip trailing slashes so site-relative paths always start with '/'
    pub fn normalize_sites(&mut self) {
        for site in &mut self.sites {
            site.url = normalize_site_url(&site.url);
        }
    }

    /// Find the configured site a URL belongs to
    pub fn site_for_url(&self, url: &str) -> Option<&SiteConfig> {
        let url = Url::parse(url.trim())
            .map(String::from)
            .unwrap_or_else(|_| url.trim().to_string());
        self.sites
            .iter()
            .find(|site| url_belongs_to_site(&normalize_site_url(&site.url), &url))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for site in &self.sites {
            let parsed = Url::parse(&site.url)
                .map_err(|e| Error::Config(format!("Invalid site URL '{}': {}", site.url, e)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Error::Config(format!(
                    "Site URL must use http or https: {}",
                    site.url
                )));
            }
            if site.name.trim().is_empty() {
                return Err(Error::Config(format!("Site {} has an empty name", site.url)));
            }
            if !seen.insert(normalize_site_url(&site.url)) {
                return Err(Error::Config(format!("Duplicate site URL: {}", site.url)));
            }
        }

        if self.crawl.max_attempts == 0 {
            return Err(Error::Config(
                "crawl.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.search.common_lemma_ratio <= 0.0 || self.search.common_lemma_ratio > 1.0 {
            return Err(Error::Config(
                "search.common_lemma_ratio must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.search.snippet_max_chars == 0 {
            return Err(Error::Config(
                "search.snippet_max_chars must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn db_path_for(base: &Path) -> PathBuf {
    std::env::var(DB_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| base.join("index.db"))
}

/// Canonical form of a site root URL
///
/// Parsed URLs get a lowercase host and no default port, matching the form
/// links take after resolution. Unparseable input is only trimmed.
pub fn normalize_site_url(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

/// Check whether `url` lies under the site rooted at `site_url`
///
/// `site_url` must already be normalized. A bare prefix match is not enough:
/// `https://a.com` must not claim `https://a.com.evil.org/`.
pub fn url_belongs_to_site(site_url: &str, url: &str) -> bool {
    match url.strip_prefix(site_url) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}
