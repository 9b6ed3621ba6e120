//! Storage traits and error types
//!
//! The crawl and enrichment cores only see these small capability traits;
//! the SQLite backend in this crate is one implementation of them.

use crate::crawler::{CrawlMetrics, CrawlResult};
use crate::enrichment::{EnrichmentKey, JobDetailEnrichment};
use crate::ingest::{IngestionCursor, IngestionCursorKey};
use crate::state::EnrichmentStatus;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Cursor not found: {0}")]
    CursorNotFound(String),

    #[error("Enrichment not found: {0}")]
    EnrichmentNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence of ingestion cursors, keyed on the normalized 4-part key
pub trait CursorStore: Send + Sync {
    /// Looks up the cursor row for `key`
    fn find_by_key(&self, key: &IngestionCursorKey) -> StorageResult<Option<IngestionCursor>>;

    /// Inserts or updates the row for the cursor's key
    ///
    /// # Returns
    ///
    /// The cursor as stored, including its row id
    fn save(&self, cursor: &IngestionCursor) -> StorageResult<IngestionCursor>;

    /// Lists every persisted cursor
    fn list_cursors(&self) -> StorageResult<Vec<IngestionCursor>>;
}

/// Persistence of deferred enrichment rows
pub trait EnrichmentStore: Send + Sync {
    /// Finds up to `limit` rows of `key` in `status` whose next retry time is
    /// at or before `cutoff`, earliest first
    ///
    /// Pending rows without a retry time are due immediately.
    fn find_due(
        &self,
        key: EnrichmentKey,
        status: EnrichmentStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<JobDetailEnrichment>>;

    /// Conditionally moves a row from `expected` to `target`
    ///
    /// This is a single compare-and-set write. It affects the row only if its
    /// status still equals `expected` at update time, so concurrent callers
    /// racing for the same row see exactly one success.
    ///
    /// # Returns
    ///
    /// The number of rows affected: 1 if claimed, 0 if the row had already
    /// moved on
    fn mark_retrying(
        &self,
        id: i64,
        expected: EnrichmentStatus,
        target: EnrichmentStatus,
        attempted_at: DateTime<Utc>,
    ) -> StorageResult<usize>;

    /// Writes the outcome of a processed attempt
    fn record_attempt(
        &self,
        id: i64,
        status: EnrichmentStatus,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
        attempted_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Creates an enrichment row for a job
    fn insert_enrichment(
        &self,
        job_id: i64,
        key: EnrichmentKey,
        status: EnrichmentStatus,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> StorageResult<i64>;

    /// Gets an enrichment row by id
    fn get_enrichment(&self, id: i64) -> StorageResult<Option<JobDetailEnrichment>>;
}

/// Downstream consumer of parsed results
pub trait ResultSink: Send + Sync {
    /// Accepts one page's results along with the session metrics so far
    ///
    /// # Returns
    ///
    /// The number of results persisted
    fn accept(&self, results: &[CrawlResult], metrics: &CrawlMetrics) -> StorageResult<usize>;
}
