//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Ingestion cursor persistence keyed on the normalized cursor key
//! - Job upserts by source and external id
//! - The enrichment claim protocol
//! - Crawl session bookkeeping

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{CursorStore, EnrichmentStore, ResultSink, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}

/// A persisted job posting
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub company: Option<String>,
    pub posted_at: String,
    pub url: Option<String>,
    pub tags: Vec<String>,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

/// A persisted crawl session outcome
#[derive(Debug, Clone)]
pub struct CrawlRunRecord {
    pub id: String,
    pub source_code: String,
    pub blueprint_code: String,
    pub state: String,
    pub pages_fetched: u32,
    pub results_persisted: u64,
    pub timed_out: bool,
    pub failure_reason: Option<String>,
    pub config_hash: String,
    pub started_at: String,
    pub finished_at: String,
}
