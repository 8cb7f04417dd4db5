//! Index storage using SQLite
//!
//! This module owns the persisted data model:
//! - Sites (one per configured URL, with crawl status)
//! - Pages (raw HTML per site-relative path)
//! - Lemmas (per-site page frequency)
//! - Search index entries (per-page lemma rank)
//!
//! Every multi-statement write runs in a single transaction under the
//! store's writer lock, so readers never observe a page whose index rows
//! and lemma frequencies disagree.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Bound on bind parameters per generated `IN (...)` list
const MAX_IN_PARAMS: usize = 500;

/// Site crawl status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiteStatus::Indexing => write!(f, "INDEXING"),
            SiteStatus::Indexed => write!(f, "INDEXED"),
            SiteStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for SiteStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "INDEXING" => Ok(SiteStatus::Indexing),
            "INDEXED" => Ok(SiteStatus::Indexed),
            "FAILED" => Ok(SiteStatus::Failed),
            _ => Err(Error::Other(format!("Unknown site status: {}", s))),
        }
    }
}

/// A site row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub status: String,
    pub status_time: String,
    pub last_error: Option<String>,
}

impl Site {
    pub fn get_status(&self) -> Result<SiteStatus> {
        self.status.parse()
    }

    /// `status_time` as Unix epoch milliseconds, 0 if unparsable
    pub fn status_time_millis(&self) -> i64 {
        DateTime::parse_from_rfc3339(&self.status_time)
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    }
}

/// A stored page
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub site_id: i64,
    pub path: String,
    pub code: i64,
    pub content: String,
}

/// A site-scoped lemma row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lemma {
    pub id: i64,
    pub site_id: i64,
    pub lemma: String,
    pub frequency: i64,
}

/// A page joined with its owning site, as search results need it
#[derive(Debug, Clone, FromRow)]
pub struct PageWithSite {
    pub id: i64,
    pub path: String,
    pub content: String,
    pub site_url: String,
    pub site_name: String,
}

/// Page and lemma counts for one site
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SiteCounts {
    pub pages: u64,
    pub lemmas: u64,
}

/// Index database handle
#[derive(Clone)]
pub struct IndexStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

impl IndexStore {
    /// Open the database named by the configuration
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Open (creating if needed) the database at `db_path` and ensure its schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10))
            .foreign_keys(true);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    // ===== Site Operations =====

    /// Find a site by its normalized URL
    pub async fn find_site_by_url(&self, url: &str) -> Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>("SELECT * FROM sites WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(site)
    }

    /// Get site by ID
    pub async fn get_site(&self, id: i64) -> Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>("SELECT * FROM sites WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(site)
    }

    /// List all sites
    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let sites = sqlx::query_as::<_, Site>("SELECT * FROM sites ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(sites)
    }

    /// Return the site for `url`, inserting it with `status` if absent
    pub async fn ensure_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("INSERT INTO sites (url, name, status, status_time) VALUES (?, ?, ?, ?) ON CONFLICT(url) DO NOTHING")
            .bind(url)
            .bind(name)
            .bind(status.to_string())
            .bind(now())
            .execute(&self.pool)
            .await?;

        let site = sqlx::query_as::<_, Site>("SELECT * FROM sites WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(site)
    }

    /// Prepare a site for a fresh crawl run
    ///
    /// Reuses (or creates) the row for `url`, refreshes its name, removes all
    /// previously indexed data, clears `last_error`, and sets INDEXING, all in
    /// one transaction.
    pub async fn begin_site_run(&self, url: &str, name: &str) -> Result<Site> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let site = sqlx::query_as::<_, Site>(
            r#"
            INSERT INTO sites (url, name, status, status_time, last_error)
            VALUES (?, ?, ?, ?, NULL)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                status_time = excluded.status_time,
                last_error = NULL
            RETURNING *
            "#,
        )
        .bind(url)
        .bind(name)
        .bind(SiteStatus::Indexing.to_string())
        .bind(now())
        .fetch_one(&mut *tx)
        .await?;

        delete_site_data_in(&mut tx, site.id).await?;
        tx.commit().await?;

        info!("Prepared site {} for indexing", site.url);
        Ok(site)
    }

    /// Set a site's status, stamping `status_time`
    pub async fn set_site_status(
        &self,
        site_id: i64,
        status: SiteStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("UPDATE sites SET status = ?, status_time = ?, last_error = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(now())
            .bind(last_error)
            .bind(site_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Refresh a site's `status_time` without changing its status
    pub async fn touch_site(&self, site_id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("UPDATE sites SET status_time = ? WHERE id = ?")
            .bind(now())
            .bind(site_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Page Operations =====

    /// Get page by site and site-relative path
    pub async fn find_page(&self, site_id: i64, path: &str) -> Result<Option<Page>> {
        let page = sqlx::query_as::<_, Page>("SELECT * FROM pages WHERE site_id = ? AND path = ?")
            .bind(site_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(page)
    }

    /// Replace the page at `path` and its index entries in one transaction
    ///
    /// Any existing page at the same path is deleted first, decrementing the
    /// frequencies it contributed. Each lemma then gains exactly one unit of
    /// frequency and one index entry whose rank is its occurrence count.
    pub async fn replace_page(
        &self,
        site_id: i64,
        path: &str,
        code: u16,
        content: &str,
        lemmas: &BTreeMap<String, u32>,
    ) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM pages WHERE site_id = ? AND path = ?")
                .bind(site_id)
                .bind(path)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(page_id) = existing {
            delete_page_in(&mut tx, site_id, page_id).await?;
        }

        let page_id: i64 = sqlx::query_scalar(
            "INSERT INTO pages (site_id, path, code, content) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(site_id)
        .bind(path)
        .bind(i64::from(code))
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        for (lemma, rank) in lemmas {
            let lemma_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO lemmas (site_id, lemma, frequency) VALUES (?, ?, 1)
                ON CONFLICT(site_id, lemma) DO UPDATE SET frequency = frequency + 1
                RETURNING id
                "#,
            )
            .bind(site_id)
            .bind(lemma)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO search_index (page_id, lemma_id, rank) VALUES (?, ?, ?)")
                .bind(page_id)
                .bind(lemma_id)
                .bind(i64::from(*rank))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(
            "Indexed page {} of site {} with {} lemmas",
            path,
            site_id,
            lemmas.len()
        );
        Ok(page_id)
    }

    /// Delete a page, its index entries, and its share of lemma frequencies
    pub async fn delete_page(&self, page: &Page) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        delete_page_in(&mut tx, page.site_id, page.id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Remove every page, lemma, and index entry of a site
    pub async fn delete_site_data(&self, site_id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        delete_site_data_in(&mut tx, site_id).await?;
        tx.commit().await?;
        Ok(())
    }

    // ===== Search Reads =====

    /// Number of pages in one site, or across all sites
    pub async fn count_pages(&self, site_id: Option<i64>) -> Result<u64> {
        let count: i64 = match site_id {
            Some(id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE site_id = ?")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM pages")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count as u64)
    }

    /// Lemma rows with the given text, in one site or across all sites
    pub async fn find_lemmas(&self, lemma: &str, site_id: Option<i64>) -> Result<Vec<Lemma>> {
        let rows = match site_id {
            Some(id) => {
                sqlx::query_as::<_, Lemma>("SELECT * FROM lemmas WHERE lemma = ? AND site_id = ?")
                    .bind(lemma)
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, Lemma>("SELECT * FROM lemmas WHERE lemma = ? ORDER BY site_id")
                    .bind(lemma)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    /// Distinct pages indexed under any of the given lemma rows
    pub async fn page_ids_for_lemmas(&self, lemma_ids: &[i64]) -> Result<Vec<i64>> {
        let mut page_ids = Vec::new();
        for chunk in lemma_ids.chunks(MAX_IN_PARAMS) {
            let query = format!(
                "SELECT DISTINCT page_id FROM search_index WHERE lemma_id IN ({})",
                placeholders(chunk.len())
            );
            let mut query_builder = sqlx::query_scalar::<_, i64>(&query);
            for id in chunk {
                query_builder = query_builder.bind(*id);
            }
            page_ids.extend(query_builder.fetch_all(&self.pool).await?);
        }
        page_ids.sort_unstable();
        page_ids.dedup();
        Ok(page_ids)
    }

    /// Sum of ranks per page over the given lemma rows
    pub async fn summed_ranks(
        &self,
        page_ids: &[i64],
        lemma_ids: &[i64],
    ) -> Result<HashMap<i64, i64>> {
        let mut ranks: HashMap<i64, i64> = HashMap::new();
        if lemma_ids.is_empty() {
            return Ok(ranks);
        }

        for lemma_chunk in lemma_ids.chunks(MAX_IN_PARAMS) {
            for page_chunk in page_ids.chunks(MAX_IN_PARAMS) {
                let query = format!(
                    "SELECT page_id, SUM(rank) FROM search_index WHERE page_id IN ({}) AND lemma_id IN ({}) GROUP BY page_id",
                    placeholders(page_chunk.len()),
                    placeholders(lemma_chunk.len())
                );
                let mut query_builder = sqlx::query_as::<_, (i64, i64)>(&query);
                for id in page_chunk {
                    query_builder = query_builder.bind(*id);
                }
                for id in lemma_chunk {
                    query_builder = query_builder.bind(*id);
                }
                for (page_id, rank) in query_builder.fetch_all(&self.pool).await? {
                    *ranks.entry(page_id).or_insert(0) += rank;
                }
            }
        }
        Ok(ranks)
    }

    /// Get a page together with its site's URL and name
    pub async fn get_page_with_site(&self, page_id: i64) -> Result<Option<PageWithSite>> {
        let page = sqlx::query_as::<_, PageWithSite>(
            r#"
            SELECT p.id, p.path, p.content, s.url AS site_url, s.name AS site_name
            FROM pages p
            JOIN sites s ON p.site_id = s.id
            WHERE p.id = ?
            "#,
        )
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(page)
    }

    // ===== Statistics =====

    /// Total number of lemma rows, in one site or across all sites
    pub async fn count_lemmas(&self, site_id: Option<i64>) -> Result<u64> {
        let count: i64 = match site_id {
            Some(id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM lemmas WHERE site_id = ?")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM lemmas")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count as u64)
    }

    /// Page and lemma counts of one site
    pub async fn site_counts(&self, site_id: i64) -> Result<SiteCounts> {
        Ok(SiteCounts {
            pages: self.count_pages(Some(site_id)).await?,
            lemmas: self.count_lemmas(Some(site_id)).await?,
        })
    }

    /// Whether any site row is currently INDEXING
    pub async fn any_site_indexing(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sites WHERE status = ?")
            .bind(SiteStatus::Indexing.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Lemma rows whose frequency disagrees with their index entry count
    pub async fn frequency_mismatches(&self) -> Result<Vec<Lemma>> {
        let rows = sqlx::query_as::<_, Lemma>(
            r#"
            SELECT l.* FROM lemmas l
            WHERE l.frequency != (SELECT COUNT(*) FROM search_index i WHERE i.lemma_id = l.id)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn delete_page_in(conn: &mut SqliteConnection, site_id: i64, page_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE lemmas SET frequency = frequency - 1 WHERE id IN (SELECT lemma_id FROM search_index WHERE page_id = ?)",
    )
    .bind(page_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM search_index WHERE page_id = ?")
        .bind(page_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM lemmas WHERE site_id = ? AND frequency <= 0")
        .bind(site_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM pages WHERE id = ?")
        .bind(page_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn delete_site_data_in(conn: &mut SqliteConnection, site_id: i64) -> Result<()> {
    sqlx::query(
        "DELETE FROM search_index WHERE page_id IN (SELECT id FROM pages WHERE site_id = ?)",
    )
    .bind(site_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM lemmas WHERE site_id = ?")
        .bind(site_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM pages WHERE site_id = ?")
        .bind(site_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
