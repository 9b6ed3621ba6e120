//! Job-Crawler: a configuration-driven job posting crawler
//!
//! This crate drives blueprint-described career sites page by page, turns each
//! fetched page into normalized job records, keeps a resumable ingestion cursor
//! per source, and re-dispatches deferred enrichment work under concurrent
//! workers.

pub mod config;
pub mod crawler;
pub mod enrichment;
pub mod ingest;
pub mod output;
pub mod state;
pub mod storage;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Job-Crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown crawler blueprint: {0}")]
    UnknownBlueprint(String),

    #[error("Session queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Run budget of {budget:?} exceeded")]
    RunTimeout { budget: Duration },
}

/// Errors raised while fetching a single page
///
/// Timeouts, transport failures and bad statuses are retried by the session
/// controller. An invalid page URL fails the page without retrying.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Request timeout for {url} after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("Transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid page URL: {0}")]
    InvalidUrl(String),
}

/// Errors raised while applying parsing rules to a page
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Malformed page content: {0}")]
    Malformed(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Source '{source_code}' references unknown blueprint '{blueprint}'")]
    UnknownBlueprint {
        source_code: String,
        blueprint: String,
    },
}

/// Result type alias for Job-Crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlBlueprint, CrawlContext, CrawlOutcome, CrawlResult, SessionController};
pub use enrichment::{EnrichmentRetryScheduler, JobDetailEnrichment};
pub use ingest::{IngestionCursor, IngestionCursorKey};
pub use state::{EnrichmentStatus, SessionState};
