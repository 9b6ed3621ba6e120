//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.
//! One connection is shared behind a mutex; every statement is short, so
//! callers on async workers hold the lock only briefly.

use crate::crawler::{CrawlMetrics, CrawlOutcome, CrawlResult};
use crate::enrichment::{EnrichmentKey, JobDetailEnrichment};
use crate::ingest::{IngestionCursor, IngestionCursorKey};
use crate::state::EnrichmentStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    CursorStore, EnrichmentStore, ResultSink, StorageError, StorageResult,
};
use crate::storage::{CrawlRunRecord, JobRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        // Several stores may share one file; wait for the write lock instead
        // of failing with SQLITE_BUSY.
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }

    /// Records the outcome of one crawl session
    pub fn record_session(&self, outcome: &CrawlOutcome, config_hash: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO crawl_runs (id, source_code, blueprint_code, state, pages_fetched,
             items_parsed, items_skipped, fetch_errors, parse_errors, results_persisted,
             timed_out, failure_reason, config_hash, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                outcome.session_id.to_string(),
                outcome.source_code,
                outcome.blueprint_code,
                outcome.state.as_str(),
                outcome.metrics.pages_fetched,
                outcome.metrics.items_parsed as i64,
                outcome.metrics.items_skipped as i64,
                outcome.metrics.fetch_errors,
                outcome.metrics.parse_errors,
                outcome.results_persisted as i64,
                outcome.timed_out,
                outcome.failure_reason,
                config_hash,
                format_ts(&outcome.started_at),
                format_ts(&outcome.finished_at),
            ],
        )?;
        Ok(())
    }

    /// Gets the most recent sessions, newest first
    pub fn recent_sessions(&self, limit: usize) -> StorageResult<Vec<CrawlRunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_code, blueprint_code, state, pages_fetched, results_persisted,
             timed_out, failure_reason, config_hash, started_at, finished_at
             FROM crawl_runs ORDER BY finished_at DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(CrawlRunRecord {
                    id: row.get(0)?,
                    source_code: row.get(1)?,
                    blueprint_code: row.get(2)?,
                    state: row.get(3)?,
                    pages_fetched: row.get(4)?,
                    results_persisted: row.get::<_, i64>(5)? as u64,
                    timed_out: row.get(6)?,
                    failure_reason: row.get(7)?,
                    config_hash: row.get(8)?,
                    started_at: row.get(9)?,
                    finished_at: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    /// Gets a job by its source and external id
    pub fn get_job(&self, source: &str, external_id: &str) -> StorageResult<Option<JobRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, external_id, title, company, posted_at, url, tags,
             first_seen_at, last_seen_at
             FROM jobs WHERE source = ?1 AND external_id = ?2",
        )?;

        let job = stmt
            .query_row(params![source, external_id], |row| {
                let tags: String = row.get(7)?;
                Ok(JobRecord {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    external_id: row.get(2)?,
                    title: row.get(3)?,
                    company: row.get(4)?,
                    posted_at: row.get(5)?,
                    url: row.get(6)?,
                    tags: serde_json::from_str(&tags).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e))
                    })?,
                    first_seen_at: row.get(8)?,
                    last_seen_at: row.get(9)?,
                })
            })
            .optional()?;

        Ok(job)
    }

    /// Counts persisted jobs
    pub fn count_jobs(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl CursorStore for SqliteStore {
    fn find_by_key(&self, key: &IngestionCursorKey) -> StorageResult<Option<IngestionCursor>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_code, source_name, company, category, last_posted_at,
             last_external_id, next_page_token, last_ingested_at, create_time
             FROM ingestion_cursors
             WHERE source_code = ?1 AND source_name = ?2 AND company = ?3 AND category = ?4",
        )?;

        let cursor = stmt
            .query_row(
                params![
                    key.source_code(),
                    key.source_name(),
                    key.company(),
                    key.category()
                ],
                cursor_from_row,
            )
            .optional()?;

        Ok(cursor)
    }

    fn save(&self, cursor: &IngestionCursor) -> StorageResult<IngestionCursor> {
        let now = Utc::now();
        {
            let conn = self.lock()?;
            let key = &cursor.key;
            conn.execute(
                "INSERT INTO ingestion_cursors (source_code, source_name, company, category,
                 last_posted_at, last_external_id, next_page_token, last_ingested_at,
                 create_time, update_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(source_code, source_name, company, category) DO UPDATE SET
                    last_posted_at = excluded.last_posted_at,
                    last_external_id = excluded.last_external_id,
                    next_page_token = excluded.next_page_token,
                    last_ingested_at = excluded.last_ingested_at,
                    update_time = excluded.update_time",
                params![
                    key.source_code(),
                    key.source_name(),
                    key.company(),
                    key.category(),
                    cursor.last_posted_at.as_ref().map(format_ts),
                    cursor.last_external_id,
                    cursor.next_page_token,
                    format_ts(&cursor.last_ingested_at.unwrap_or(now)),
                    format_ts(&cursor.create_time.unwrap_or(now)),
                    format_ts(&now),
                ],
            )?;
        }

        self.find_by_key(&cursor.key)?
            .ok_or_else(|| StorageError::CursorNotFound(cursor.key.to_string()))
    }

    fn list_cursors(&self) -> StorageResult<Vec<IngestionCursor>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_code, source_name, company, category, last_posted_at,
             last_external_id, next_page_token, last_ingested_at, create_time
             FROM ingestion_cursors
             ORDER BY source_code, source_name, company, category",
        )?;

        let cursors = stmt
            .query_map([], cursor_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(cursors)
    }
}

impl EnrichmentStore for SqliteStore {
    fn find_due(
        &self,
        key: EnrichmentKey,
        status: EnrichmentStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<JobDetailEnrichment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, enrichment_key, status_state, retry_count, last_attempt_at,
             next_retry_at, updated_at
             FROM job_detail_enrichments
             WHERE enrichment_key = ?1 AND status_state = ?2
               AND (next_retry_at <= ?3 OR (next_retry_at IS NULL AND status_state = ?5))
             ORDER BY next_retry_at ASC, id ASC
             LIMIT ?4",
        )?;

        let rows = stmt
            .query_map(
                params![
                    key.to_db_string(),
                    status.to_db_string(),
                    format_ts(&cutoff),
                    limit as i64,
                    EnrichmentStatus::Pending.to_db_string()
                ],
                enrichment_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn mark_retrying(
        &self,
        id: i64,
        expected: EnrichmentStatus,
        target: EnrichmentStatus,
        attempted_at: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let conn = self.lock()?;
        let stamp = format_ts(&attempted_at);
        let affected = conn.execute(
            "UPDATE job_detail_enrichments
             SET status_state = ?1, last_attempt_at = ?2, next_retry_at = NULL, updated_at = ?2
             WHERE id = ?3 AND status_state = ?4",
            params![target.to_db_string(), stamp, id, expected.to_db_string()],
        )?;
        Ok(affected)
    }

    fn record_attempt(
        &self,
        id: i64,
        status: EnrichmentStatus,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
        attempted_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let conn = self.lock()?;
        let stamp = format_ts(&attempted_at);
        let affected = conn.execute(
            "UPDATE job_detail_enrichments
             SET status_state = ?1, retry_count = ?2, next_retry_at = ?3,
                 last_attempt_at = ?4, updated_at = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                retry_count,
                next_retry_at.as_ref().map(format_ts),
                stamp,
                id
            ],
        )?;
        if affected == 0 {
            return Err(StorageError::EnrichmentNotFound(id));
        }
        Ok(())
    }

    fn insert_enrichment(
        &self,
        job_id: i64,
        key: EnrichmentKey,
        status: EnrichmentStatus,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> StorageResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_detail_enrichments
             (job_id, enrichment_key, status_state, retry_count, next_retry_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5)",
            params![
                job_id,
                key.to_db_string(),
                status.to_db_string(),
                next_retry_at.as_ref().map(format_ts),
                format_ts(&Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_enrichment(&self, id: i64) -> StorageResult<Option<JobDetailEnrichment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, enrichment_key, status_state, retry_count, last_attempt_at,
             next_retry_at, updated_at
             FROM job_detail_enrichments WHERE id = ?1",
        )?;

        let row = stmt
            .query_row(params![id], enrichment_from_row)
            .optional()?;
        Ok(row)
    }
}

impl ResultSink for SqliteStore {
    fn accept(&self, results: &[CrawlResult], metrics: &CrawlMetrics) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = format_ts(&Utc::now());
        let mut persisted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO jobs (source, external_id, title, company, location, level,
                 posted_at, url, description, tags, metadata, first_seen_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                 ON CONFLICT(source, external_id) DO UPDATE SET
                    title = excluded.title,
                    company = excluded.company,
                    location = excluded.location,
                    level = excluded.level,
                    posted_at = excluded.posted_at,
                    url = excluded.url,
                    description = excluded.description,
                    tags = excluded.tags,
                    metadata = excluded.metadata,
                    last_seen_at = excluded.last_seen_at",
            )?;

            for result in results {
                let tags = serde_json::to_string(&result.tags)?;
                let metadata = serde_json::to_string(&result.metadata)?;
                persisted += stmt.execute(params![
                    result.source,
                    result.external_id,
                    result.title,
                    result.company,
                    result.location,
                    result.level,
                    format_ts(&result.posted_at),
                    result.url,
                    result.description,
                    tags,
                    metadata,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(
            persisted,
            pages_fetched = metrics.pages_fetched,
            "Upserted job batch"
        );
        Ok(persisted)
    }
}

/// Formats a timestamp with fixed nanosecond precision
///
/// Stored values sort correctly as text and round-trip exactly, so a
/// reloaded cursor compares equal to the posting it was advanced to.
fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn required_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    ts_column(row, idx)?.ok_or(rusqlite::Error::InvalidColumnType(
        idx,
        "timestamp".to_string(),
        Type::Null,
    ))
}

fn cursor_from_row(row: &Row<'_>) -> rusqlite::Result<IngestionCursor> {
    let key = IngestionCursorKey::new(
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
        row.get::<_, String>(4)?,
    );
    Ok(IngestionCursor {
        id: Some(row.get(0)?),
        key,
        last_posted_at: ts_column(row, 5)?,
        last_external_id: row.get(6)?,
        next_page_token: row.get(7)?,
        last_ingested_at: ts_column(row, 8)?,
        create_time: ts_column(row, 9)?,
    })
}

fn enrichment_from_row(row: &Row<'_>) -> rusqlite::Result<JobDetailEnrichment> {
    let key_raw: String = row.get(2)?;
    let status_raw: String = row.get(3)?;
    let key = EnrichmentKey::from_db_string(&key_raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(2, key_raw.clone(), Type::Text)
    })?;
    let status = EnrichmentStatus::from_db_string(&status_raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(3, status_raw.clone(), Type::Text)
    })?;

    Ok(JobDetailEnrichment {
        id: row.get(0)?,
        job_id: row.get(1)?,
        key,
        status,
        retry_count: row.get(4)?,
        last_attempt_at: ts_column(row, 5)?,
        next_retry_at: ts_column(row, 6)?,
        updated_at: required_ts_column(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlResult;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::{Arc, Barrier};

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn result(external_id: &str, title: &str) -> CrawlResult {
        CrawlResult {
            source: "crawler:acme".to_string(),
            external_id: external_id.to_string(),
            title: title.to_string(),
            company: Some("Acme".to_string()),
            location: None,
            level: None,
            posted_at: ts(9),
            url: Some(format!("https://acme.test/jobs/{}", external_id)),
            description: None,
            raw_description: None,
            tags: vec!["rust".to_string()],
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_cursor_save_and_find() {
        let store = SqliteStore::new_in_memory().unwrap();
        let key = IngestionCursorKey::new("ashby", "", "Acme", "");
        let cursor = IngestionCursor::empty(key.clone()).advance_to_at(ts(1), Some(ts(8)), Some("j-1"));

        let saved = store.save(&cursor).unwrap();
        assert!(saved.id.is_some());

        let found = store.find_by_key(&key).unwrap().unwrap();
        assert_eq!(found.last_posted_at, Some(ts(8)));
        assert_eq!(found.last_external_id.as_deref(), Some("j-1"));
        assert_eq!(found.create_time, Some(ts(1)));

        let other = IngestionCursorKey::new("ashby", "", "acme", "");
        assert!(store.find_by_key(&other).unwrap().is_none());
    }

    #[test]
    fn test_cursor_save_updates_same_row() {
        let store = SqliteStore::new_in_memory().unwrap();
        let key = IngestionCursorKey::new("ashby", "", "Acme", "");
        let first = store
            .save(&IngestionCursor::empty(key.clone()).advance_to_at(ts(1), Some(ts(2)), Some("a")))
            .unwrap();
        let second = store
            .save(&first.advance_to_at(ts(3), Some(ts(4)), Some("b")))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.create_time, Some(ts(1)));
        assert_eq!(store.list_cursors().unwrap().len(), 1);
    }

    #[test]
    fn test_job_upsert_by_source_and_external_id() {
        let store = SqliteStore::new_in_memory().unwrap();
        let metrics = CrawlMetrics::default();

        assert_eq!(store.accept(&[result("1", "Engineer")], &metrics).unwrap(), 1);
        assert_eq!(
            store
                .accept(&[result("1", "Senior Engineer"), result("2", "Designer")], &metrics)
                .unwrap(),
            2
        );

        assert_eq!(store.count_jobs().unwrap(), 2);
        let job = store.get_job("crawler:acme", "1").unwrap().unwrap();
        assert_eq!(job.title, "Senior Engineer");
        assert_eq!(job.tags, vec!["rust".to_string()]);
    }

    #[test]
    fn test_find_due_respects_cutoff_status_and_limit() {
        let store = SqliteStore::new_in_memory().unwrap();
        let key = EnrichmentKey::Status;
        store
            .insert_enrichment(1, key, EnrichmentStatus::RetryScheduled, Some(ts(3)))
            .unwrap();
        store
            .insert_enrichment(2, key, EnrichmentStatus::RetryScheduled, Some(ts(1)))
            .unwrap();
        store
            .insert_enrichment(3, key, EnrichmentStatus::RetryScheduled, Some(ts(10)))
            .unwrap();
        store
            .insert_enrichment(4, key, EnrichmentStatus::Done, Some(ts(1)))
            .unwrap();
        store
            .insert_enrichment(5, EnrichmentKey::Summary, EnrichmentStatus::RetryScheduled, Some(ts(1)))
            .unwrap();

        let due = store
            .find_due(key, EnrichmentStatus::RetryScheduled, ts(5), 10)
            .unwrap();
        let job_ids: Vec<i64> = due.iter().map(|e| e.job_id).collect();
        assert_eq!(job_ids, vec![2, 1]);

        let limited = store
            .find_due(key, EnrichmentStatus::RetryScheduled, ts(5), 1)
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_find_due_includes_pending_rows_without_retry_time() {
        let store = SqliteStore::new_in_memory().unwrap();
        let key = EnrichmentKey::Status;
        store
            .insert_enrichment(1, key, EnrichmentStatus::Pending, None)
            .unwrap();
        store
            .insert_enrichment(2, key, EnrichmentStatus::Pending, Some(ts(10)))
            .unwrap();
        store
            .insert_enrichment(3, key, EnrichmentStatus::RetryScheduled, None)
            .unwrap();

        let pending = store.find_due(key, EnrichmentStatus::Pending, ts(5), 10).unwrap();
        let job_ids: Vec<i64> = pending.iter().map(|e| e.job_id).collect();
        assert_eq!(job_ids, vec![1]);

        // A retry-scheduled row only becomes due once it has a retry time
        let scheduled = store
            .find_due(key, EnrichmentStatus::RetryScheduled, ts(5), 10)
            .unwrap();
        assert!(scheduled.is_empty());
    }

    #[test]
    fn test_cursor_keeps_sub_microsecond_position() {
        let store = SqliteStore::new_in_memory().unwrap();
        let key = IngestionCursorKey::new("board", "", "Acme", "");
        let posted = Utc.timestamp_opt(1_717_232_400, 123_456_789).unwrap();
        let cursor = IngestionCursor::empty(key.clone()).advance_to(Some(posted), Some("a"));
        store.save(&cursor).unwrap();

        let loaded = store.find_by_key(&key).unwrap().unwrap();
        assert_eq!(loaded.last_posted_at, Some(posted));
        assert!(!loaded.is_after(Some(posted), Some("a")));
    }

    #[test]
    fn test_mark_retrying_is_compare_and_set() {
        let store = SqliteStore::new_in_memory().unwrap();
        let id = store
            .insert_enrichment(1, EnrichmentKey::Status, EnrichmentStatus::RetryScheduled, Some(ts(1)))
            .unwrap();

        let first = store
            .mark_retrying(id, EnrichmentStatus::RetryScheduled, EnrichmentStatus::Retrying, ts(2))
            .unwrap();
        let second = store
            .mark_retrying(id, EnrichmentStatus::RetryScheduled, EnrichmentStatus::Retrying, ts(2))
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);

        let row = store.get_enrichment(id).unwrap().unwrap();
        assert_eq!(row.status, EnrichmentStatus::Retrying);
        assert_eq!(row.last_attempt_at, Some(ts(2)));
        assert_eq!(row.next_retry_at, None);
    }

    #[test]
    fn test_concurrent_claims_on_shared_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claims.db");
        let seed = SqliteStore::new(&path).unwrap();
        let id = seed
            .insert_enrichment(7, EnrichmentKey::Status, EnrichmentStatus::RetryScheduled, Some(ts(1)))
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let store = SqliteStore::new(&path).unwrap();
                    barrier.wait();
                    store
                        .mark_retrying(
                            id,
                            EnrichmentStatus::RetryScheduled,
                            EnrichmentStatus::Retrying,
                            Utc::now(),
                        )
                        .unwrap()
                })
            })
            .collect();

        let mut outcomes: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        outcomes.sort();
        assert_eq!(outcomes, vec![0, 1]);
    }

    #[test]
    fn test_record_attempt_reschedules() {
        let store = SqliteStore::new_in_memory().unwrap();
        let id = store
            .insert_enrichment(1, EnrichmentKey::Status, EnrichmentStatus::Retrying, None)
            .unwrap();
        let next = ts(4) + ChronoDuration::minutes(2);

        store
            .record_attempt(id, EnrichmentStatus::RetryScheduled, 2, Some(next), ts(4))
            .unwrap();

        let row = store.get_enrichment(id).unwrap().unwrap();
        assert_eq!(row.status, EnrichmentStatus::RetryScheduled);
        assert_eq!(row.retry_count, 2);
        assert_eq!(row.next_retry_at, Some(next));

        assert!(matches!(
            store.record_attempt(999, EnrichmentStatus::Done, 0, None, ts(4)),
            Err(StorageError::EnrichmentNotFound(999))
        ));
    }
}
