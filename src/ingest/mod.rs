//! Incremental ingestion state
//!
//! This module holds the per-source ingestion cursor:
//! - Normalized 4-part cursor keys
//! - Position and continuation token updates
//! - Filtering of already-ingested postings

mod cursor;

pub use cursor::{IngestionCursor, IngestionCursorKey};
