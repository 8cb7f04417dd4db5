//! Statistics command implementation

use crate::error::Result;
use crate::store::IndexStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Totals across all sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalStatistics {
    pub sites: u64,
    pub pages: u64,
    pub lemmas: u64,
    pub indexing: bool,
}

/// Per-site statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStatisticsItem {
    pub url: String,
    pub name: String,
    pub status: String,
    /// Unix epoch milliseconds
    pub status_time: i64,
    pub error: Option<String>,
    pub pages: u64,
    pub lemmas: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsData {
    pub total: TotalStatistics,
    pub detailed: Vec<DetailedStatisticsItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub result: bool,
    pub statistics: StatisticsData,
}

/// Aggregate index statistics
pub async fn cmd_statistics(store: &IndexStore) -> Result<StatisticsResponse> {
    info!("Collecting statistics");

    let sites = store.list_sites().await?;
    let mut detailed = Vec::with_capacity(sites.len());
    for site in &sites {
        let counts = store.site_counts(site.id).await?;
        detailed.push(DetailedStatisticsItem {
            url: site.url.clone(),
            name: site.name.clone(),
            status: site.status.clone(),
            status_time: site.status_time_millis(),
            error: site.last_error.clone(),
            pages: counts.pages,
            lemmas: counts.lemmas,
        });
    }

    let total = TotalStatistics {
        sites: sites.len() as u64,
        pages: store.count_pages(None).await?,
        lemmas: store.count_lemmas(None).await?,
        indexing: store.any_site_indexing().await?,
    };

    Ok(StatisticsResponse {
        result: true,
        statistics: StatisticsData { total, detailed },
    })
}

/// Print statistics to console
pub fn print_statistics(response: &StatisticsResponse) {
    let total = &response.statistics.total;
    println!("\nIndex Statistics\n");
    println!("Sites:   {}", total.sites);
    println!("Pages:   {}", total.pages);
    println!("Lemmas:  {}", total.lemmas);
    println!("Indexing: {}", if total.indexing { "yes" } else { "no" });

    for item in &response.statistics.detailed {
        println!("\n{} ({})", item.name, item.url);
        println!("  Status: {}", item.status);
        println!("  Pages: {}, Lemmas: {}", item.pages, item.lemmas);
        if let Some(error) = &item.error {
            println!("  Error: {}", error);
        }
    }
}
