//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Job-Crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One resumption marker per source/company/category
CREATE TABLE IF NOT EXISTS ingestion_cursors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_code TEXT NOT NULL,
    source_name TEXT NOT NULL DEFAULT '',
    company TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    last_posted_at TEXT,
    last_external_id TEXT,
    next_page_token TEXT,
    last_ingested_at TEXT NOT NULL,
    create_time TEXT NOT NULL,
    update_time TEXT NOT NULL,
    UNIQUE(source_code, source_name, company, category)
);

-- Normalized job postings, one row per source and external id
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    company TEXT,
    location TEXT,
    level TEXT,
    posted_at TEXT NOT NULL,
    url TEXT,
    description TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    UNIQUE(source, external_id)
);

CREATE INDEX IF NOT EXISTS idx_jobs_posted_at ON jobs(posted_at);

-- Deferred enrichment work attached to jobs
CREATE TABLE IF NOT EXISTS job_detail_enrichments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL,
    enrichment_key TEXT NOT NULL,
    status_state TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT,
    next_retry_at TEXT,
    updated_at TEXT NOT NULL,
    UNIQUE(job_id, enrichment_key)
);

CREATE INDEX IF NOT EXISTS idx_enrichments_due
    ON job_detail_enrichments(enrichment_key, status_state, next_retry_at);

-- Outcome of every crawl session
CREATE TABLE IF NOT EXISTS crawl_runs (
    id TEXT PRIMARY KEY,
    source_code TEXT NOT NULL,
    blueprint_code TEXT NOT NULL,
    state TEXT NOT NULL,
    pages_fetched INTEGER NOT NULL,
    items_parsed INTEGER NOT NULL,
    items_skipped INTEGER NOT NULL,
    fetch_errors INTEGER NOT NULL,
    parse_errors INTEGER NOT NULL,
    results_persisted INTEGER NOT NULL,
    timed_out INTEGER NOT NULL DEFAULT 0,
    failure_reason TEXT,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
