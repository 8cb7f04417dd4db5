//! Custom error types for sitesearch

use thiserror::Error;

/// Main error type for sitesearch operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("Timed out fetching {url} after {attempts} attempts")]
    FetchTimeout { url: String, attempts: u32 },

    #[error("HTTP {status}: {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Unsupported content type {content_type}: {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Indexing stopped by user")]
    Cancelled,

    #[error("Crawl task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for sitesearch
pub type Result<T> = std::result::Result<T, Error>;
