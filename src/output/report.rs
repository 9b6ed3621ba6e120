//! Run reports for the command line
//!
//! This module turns finished sessions into a per-source summary and
//! prints it, along with the persisted ingestion cursors.

use crate::crawler::CrawlOutcome;
use crate::ingest::IngestionCursor;
use crate::state::SessionState;

/// Summary of one finished session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub source_code: String,
    pub blueprint_code: String,
    pub state: SessionState,
    pub pages_fetched: u32,
    pub items_parsed: u64,
    pub items_skipped: u64,
    pub fetch_errors: u32,
    pub parse_errors: u32,
    pub results_persisted: usize,
    pub timed_out: bool,
    pub failure_reason: Option<String>,
}

impl From<&CrawlOutcome> for SessionSummary {
    fn from(outcome: &CrawlOutcome) -> Self {
        Self {
            source_code: outcome.source_code.clone(),
            blueprint_code: outcome.blueprint_code.clone(),
            state: outcome.state,
            pages_fetched: outcome.metrics.pages_fetched,
            items_parsed: outcome.metrics.items_parsed,
            items_skipped: outcome.metrics.items_skipped,
            fetch_errors: outcome.metrics.fetch_errors,
            parse_errors: outcome.metrics.parse_errors,
            results_persisted: outcome.results_persisted,
            timed_out: outcome.timed_out,
            failure_reason: outcome.failure_reason.clone(),
        }
    }
}

/// Report over every session of one CLI run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub sessions: Vec<SessionSummary>,
    /// Sources that never produced an outcome, with the error
    pub errors: Vec<(String, String)>,
}

impl RunReport {
    pub fn push(&mut self, outcome: &CrawlOutcome) {
        self.sessions.push(SessionSummary::from(outcome));
    }

    pub fn push_error(&mut self, source_code: impl Into<String>, error: impl ToString) {
        self.errors.push((source_code.into(), error.to_string()));
    }

    pub fn failed(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.state == SessionState::Failed)
            .count()
            + self.errors.len()
    }

    pub fn total_persisted(&self) -> usize {
        self.sessions.iter().map(|s| s.results_persisted).sum()
    }

    pub fn total_pages(&self) -> u64 {
        self.sessions.iter().map(|s| u64::from(s.pages_fetched)).sum()
    }
}

/// Prints a run report to stdout in a formatted manner
pub fn print_run_report(report: &RunReport) {
    println!("=== Crawl Report ===\n");

    for session in &report.sessions {
        println!("{} ({}): {}", session.source_code, session.blueprint_code, session.state);
        println!("  Pages fetched: {}", session.pages_fetched);
        println!(
            "  Items parsed: {} ({} skipped)",
            session.items_parsed, session.items_skipped
        );
        println!("  Fetch errors: {}", session.fetch_errors);
        println!("  Parse errors: {}", session.parse_errors);
        println!("  Results persisted: {}", session.results_persisted);
        if session.timed_out {
            println!("  Timed out: yes");
        }
        if let Some(reason) = &session.failure_reason {
            println!("  Reason: {}", reason);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for (source, error) in &report.errors {
            println!("  - {}: {}", source, error);
        }
        println!();
    }

    println!(
        "Sessions: {} ({} failed), pages fetched: {}, results persisted: {}",
        report.sessions.len() + report.errors.len(),
        report.failed(),
        report.total_pages(),
        report.total_persisted()
    );
}

/// Prints persisted ingestion cursors
pub fn print_cursors(cursors: &[IngestionCursor]) {
    println!("=== Ingestion Cursors ({}) ===\n", cursors.len());

    for cursor in cursors {
        println!("{}", cursor.key);
        println!(
            "  Last posted at: {}",
            cursor
                .last_posted_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );
        println!(
            "  Last external id: {}",
            cursor.last_external_id.as_deref().unwrap_or("-")
        );
        if let Some(token) = &cursor.next_page_token {
            println!("  Next page token: {}", token);
        }
        if let Some(ingested) = cursor.last_ingested_at {
            println!("  Last ingested at: {}", ingested.to_rfc3339());
        }
    }
}
