//! Default values for configuration

use crate::lemma::Language;

/// Default user agent
pub fn default_crawl_user_agent() -> String {
    format!("sitesearch/{} (Site Indexer)", env!("CARGO_PKG_VERSION"))
}

/// Default referrer sent with every crawl request
pub fn default_crawl_referrer() -> String {
    "https://www.google.com".to_string()
}

/// Default delay between two requests of one crawl task (milliseconds)
pub fn default_crawl_request_delay() -> u64 {
    500
}

/// Default maximum crawl depth (link hops from the site root)
pub fn default_crawl_max_depth() -> u32 {
    10
}

/// Default maximum pages indexed per site in one run
pub fn default_crawl_max_pages() -> u32 {
    1000
}

/// Default number of fetch attempts on timeout
pub fn default_crawl_max_attempts() -> u32 {
    3
}

/// Default pause before retrying a timed out fetch (milliseconds)
pub fn default_crawl_retry_delay() -> u64 {
    1000
}

/// Default request timeout (milliseconds)
pub fn default_crawl_timeout() -> u64 {
    10_000
}

/// Default: size the worker pool to available parallelism
pub fn default_crawl_workers() -> usize {
    0
}

/// Sites with fewer pages than this skip common-lemma filtering
pub fn default_search_small_site_threshold() -> u64 {
    200
}

/// Lemmas present on a larger share of pages than this are dropped from queries
pub fn default_search_common_lemma_ratio() -> f64 {
    0.99
}

/// Default number of results per page
pub fn default_search_limit() -> usize {
    20
}

/// Default maximum snippet length in characters (without markup)
pub fn default_snippet_max_chars() -> usize {
    300
}

/// Default number of words kept on each side of a match run
pub fn default_snippet_context_words() -> usize {
    8
}

/// Default lemmatizer language
pub fn default_lemmatizer_language() -> Language {
    Language::English
}
