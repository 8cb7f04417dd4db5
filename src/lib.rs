//! sitesearch: crawl configured web sites into a lemma index and search it
//!
//! The crate is organised leaf-first:
//! - `lemma` turns text into lemma frequencies
//! - `crawl` walks each site and feeds pages to `index`
//! - `index` and `store` keep the SQLite index consistent
//! - `search` answers ranked queries over the same store
//! - `commands` exposes the operations the CLI calls

pub mod commands;
pub mod config;
pub mod crawl;
pub mod error;
pub mod index;
pub mod lemma;
pub mod parse;
pub mod search;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
