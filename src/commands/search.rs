//! Search command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lemma::Lemmatizer;
use crate::search::{SearchEngine, SearchHit};
use crate::store::IndexStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Search options
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict results to this site URL
    pub site: Option<String>,

    /// Results to skip
    pub offset: usize,

    /// Results to return (defaults to `search.default_limit`)
    pub limit: Option<usize>,
}

/// Search results as returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub result: bool,
    pub count: usize,
    pub data: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    fn failed(message: String) -> Self {
        Self {
            result: false,
            count: 0,
            data: Vec::new(),
            error: Some(message),
        }
    }
}

/// Execute a search query
///
/// Invalid input (blank query, unknown site) comes back as a failed
/// response; storage errors propagate.
pub async fn cmd_search(
    config: &Config,
    store: &IndexStore,
    query: &str,
    options: SearchOptions,
) -> Result<SearchResponse> {
    info!("Searching for: {}", query);

    let engine = SearchEngine::new(
        store.clone(),
        Lemmatizer::new(config.lemmatizer.language),
        config.search.clone(),
    );
    let limit = options.limit.unwrap_or(config.search.default_limit);

    match engine
        .search(query, options.site.as_deref(), options.offset, limit)
        .await
    {
        Ok(page) => Ok(SearchResponse {
            result: true,
            count: page.total_count,
            data: page.results,
            error: None,
        }),
        Err(e @ (Error::InvalidInput(_) | Error::SiteNotFound(_))) => {
            Ok(SearchResponse::failed(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Print search results to console
pub fn print_search_results(response: &SearchResponse) {
    if let Some(error) = &response.error {
        println!("✗ {}", error);
        return;
    }

    if response.data.is_empty() {
        println!("No results found.");
        return;
    }

    println!(
        "\nShowing {} of {} results:\n",
        response.data.len(),
        response.count
    );

    for (i, hit) in response.data.iter().enumerate() {
        let title = if hit.title.is_empty() {
            hit.path.as_str()
        } else {
            hit.title.as_str()
        };
        println!("{}. {} (relevance: {:.3})", i + 1, title, hit.relevance);
        println!("   {}{} [{}]", hit.site, hit.path, hit.site_name);
        if !hit.snippet.is_empty() {
            println!("   {}", hit.snippet);
        }
        println!();
    }
}
