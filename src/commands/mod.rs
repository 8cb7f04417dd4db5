//! Boundary operations: crawl control, single-page indexing, search, statistics

pub mod indexing;
pub mod init;
pub mod search;
pub mod statistics;

pub use indexing::*;
pub use init::*;
pub use search::*;
pub use statistics::*;
