//! Output module for crawl reports
//!
//! This module handles printing per-session summaries and persisted
//! ingestion cursors for the command line.

mod report;

pub use report::{print_cursors, print_run_report, RunReport, SessionSummary};
