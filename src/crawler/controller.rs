//! Crawl session controller
//!
//! Drives one blueprint run through `Init -> Fetching -> Parsing -> Advancing`
//! until pagination stops or the session fails. Pages are processed strictly
//! in fetch order; results collected before a failure are always returned.

use crate::config::{CrawlerConfig, PagingMode};
use crate::crawler::blueprint::CrawlBlueprint;
use crate::crawler::context::CrawlContext;
use crate::crawler::engine::{CrawlResult, ParserEngine};
use crate::crawler::fetcher::{CrawlPageSnapshot, PageFetcher};
use crate::crawler::pagination::{CrawlPageRequest, Continuation, PageOutcome, PaginationDriver};
use crate::crawler::session::{CrawlOutcome, CrawlSession};
use crate::ingest::IngestionCursor;
use crate::state::SessionState;
use crate::storage::{CursorStore, ResultSink, StorageError};
use crate::{CrawlError, FetchError};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{sleep, sleep_until, timeout, Instant};

/// Reason recorded for blueprints that are switched off or incomplete
pub const DISABLED_REASON: &str = "disabled";

/// Reason recorded when the overall run budget runs out
pub const BUDGET_REASON: &str = "run budget exceeded";

/// Why a page could not be fetched
enum FetchFailure {
    Budget,
    Exhausted(String),
}

/// Everything a session accumulates besides its metrics
#[derive(Default)]
struct RunLedger {
    results: Vec<CrawlResult>,
    seen: HashSet<String>,
    persisted: usize,
    failure_reason: Option<String>,
    timed_out: bool,
    cursor: Option<IngestionCursor>,
    persistence_error: Option<StorageError>,
}

/// Runs crawl sessions against injected fetch, cursor and sink capabilities
pub struct SessionController {
    fetcher: Arc<dyn PageFetcher>,
    cursors: Arc<dyn CursorStore>,
    sink: Arc<dyn ResultSink>,
    config: CrawlerConfig,
}

impl SessionController {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        cursors: Arc<dyn CursorStore>,
        sink: Arc<dyn ResultSink>,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            fetcher,
            cursors,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Runs one session to completion
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - The session ended DONE or FAILED; partial
    ///   results, metrics and any persistence failure are in the outcome
    /// * `Err(CrawlError::Storage)` - The session's cursor could not be loaded
    pub async fn run(&self, blueprint: Arc<CrawlBlueprint>, context: CrawlContext) -> crate::Result<CrawlOutcome> {
        let mut session = CrawlSession::new(blueprint.clone(), context);
        let mut ledger = RunLedger::default();

        if !blueprint.enabled || !blueprint.is_configured() {
            tracing::info!(
                blueprint = %blueprint.code,
                source = %session.context.source_code,
                "Blueprint is disabled or not configured, skipping"
            );
            session.transition(SessionState::Done);
            ledger.failure_reason = Some(DISABLED_REASON.to_string());
            return Ok(finish(session, ledger));
        }

        let key = session.context.cursor_key();
        let baseline = self
            .cursors
            .find_by_key(&key)?
            .unwrap_or_else(|| IngestionCursor::empty(key));
        ledger.cursor = Some(baseline.clone());

        let deadline = self.config.run_budget().map(|budget| Instant::now() + budget);
        let mut request = PaginationDriver::initial(
            &blueprint.code,
            &session.context,
            blueprint.paging.page_size,
            blueprint.paging.max_pages,
        );

        tracing::info!(
            session = %session.id,
            blueprint = %blueprint.code,
            source = %session.context.source_code,
            "Starting crawl session"
        );

        loop {
            session.pagination = request.pagination.clone();
            session.transition(SessionState::Fetching);

            let snapshot = match self.fetch_page(&mut session, &request, deadline).await {
                Ok(snapshot) => snapshot,
                Err(FetchFailure::Budget) => {
                    tracing::warn!(session = %session.id, page = request.pagination.page, "Run budget exceeded");
                    ledger.timed_out = true;
                    ledger.failure_reason = Some(BUDGET_REASON.to_string());
                    session.transition(SessionState::Failed);
                    break;
                }
                Err(FetchFailure::Exhausted(reason)) => {
                    tracing::error!(session = %session.id, "{}", reason);
                    ledger.failure_reason = Some(reason);
                    session.transition(SessionState::Failed);
                    break;
                }
            };
            session.metrics.pages_fetched += 1;

            session.transition(SessionState::Parsing);
            let parsed = match ParserEngine::parse(&session, &snapshot) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        session = %session.id,
                        page = request.pagination.page,
                        "Failed to parse {}: {}",
                        snapshot.url,
                        e
                    );
                    session.metrics.parse_errors += 1;
                    Vec::new()
                }
            };
            let next_token = blueprint.rules.next_token(&snapshot.content);
            let has_more_signal = blueprint.rules.has_more(&snapshot.content);

            session.transition(SessionState::Advancing);
            let parsed_count = parsed.len();
            let fresh: Vec<CrawlResult> = parsed
                .into_iter()
                .filter(|r| {
                    baseline.is_after(Some(r.posted_at), Some(&r.external_id))
                        && ledger.seen.insert(r.external_id.clone())
                })
                .collect();
            let fresh_count = fresh.len();
            session.metrics.items_parsed += parsed_count as u64;
            session.metrics.items_skipped += (parsed_count - fresh_count) as u64;

            if let Err(e) = self.persist_page(&session, &fresh, next_token.as_deref(), &mut ledger) {
                tracing::error!(session = %session.id, page = request.pagination.page, "{}", e);
                ledger.failure_reason = Some(e.to_string());
                ledger.persistence_error = Some(e);
                ledger.results.extend(fresh);
                session.transition(SessionState::Failed);
                break;
            }
            ledger.results.extend(fresh);

            let has_more = has_more_signal.unwrap_or_else(|| match blueprint.paging.mode {
                PagingMode::None => false,
                PagingMode::CursorToken => next_token.is_some(),
                _ => parsed_count > 0,
            });
            let outcome = PageOutcome {
                new_items: fresh_count,
                has_more,
                next_token,
            };

            match PaginationDriver::next(&request, &outcome) {
                Continuation::Next(next) => {
                    tracing::debug!(
                        session = %session.id,
                        page = request.pagination.page,
                        new_items = fresh_count,
                        "Advancing to page {}",
                        next.pagination.page
                    );
                    request = next;
                }
                Continuation::Stop { pagination, reason } => {
                    tracing::debug!(session = %session.id, reason = reason.as_str(), "Pagination stopped");
                    session.pagination = pagination;
                    session.transition(SessionState::Done);
                    break;
                }
            }
        }

        let outcome = finish(session, ledger);
        tracing::info!(
            session = %outcome.session_id,
            blueprint = %outcome.blueprint_code,
            source = %outcome.source_code,
            state = outcome.state.as_str(),
            pages = outcome.metrics.pages_fetched,
            results = outcome.results.len(),
            "Crawl session finished"
        );
        Ok(outcome)
    }

    /// Runs one session and turns a failure into an error
    ///
    /// Partial results are dropped with the error; use [`SessionController::run`]
    /// to keep them.
    pub async fn run_checked(&self, blueprint: Arc<CrawlBlueprint>, context: CrawlContext) -> crate::Result<CrawlOutcome> {
        let mut outcome = self.run(blueprint, context).await?;
        if let Some(error) = outcome.persistence_error.take() {
            return Err(error.into());
        }
        if outcome.timed_out {
            return Err(CrawlError::RunTimeout {
                budget: self.config.run_budget().unwrap_or_default(),
            });
        }
        Ok(outcome)
    }

    /// Fetches one page with per-attempt timeouts and backoff between attempts
    async fn fetch_page(
        &self,
        session: &mut CrawlSession,
        request: &CrawlPageRequest,
        deadline: Option<Instant>,
    ) -> Result<CrawlPageSnapshot, FetchFailure> {
        let page = request.pagination.page;
        let url = match session.blueprint.page_url(&request.context, &request.pagination) {
            Ok(url) => url,
            Err(e) => {
                session.metrics.fetch_errors += 1;
                return Err(FetchFailure::Exhausted(format!("page {} fetch failed: {}", page, e)));
            }
        };

        // Every page request is a fresh page load
        let per_request = self.config.navigation_timeout();
        let attempts = self.config.fetch_attempts.max(1);
        let mut last_error: Option<FetchError> = None;

        for attempt in 1..=attempts {
            let bound = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(FetchFailure::Budget);
                    }
                    per_request.min(remaining)
                }
                None => per_request,
            };

            let result = match timeout(bound, self.fetcher.fetch(request, &url)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout {
                    url: url.clone(),
                    after: bound,
                }),
            };

            match result {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    session.metrics.fetch_errors += 1;
                    tracing::warn!(
                        session = %session.id,
                        page,
                        attempt,
                        "Fetch attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }

            if deadline.map_or(false, |d| Instant::now() >= d) {
                return Err(FetchFailure::Budget);
            }

            if attempt < attempts {
                let delay = self.config.backoff_for(attempt);
                match deadline {
                    Some(deadline) if Instant::now() + delay >= deadline => {
                        sleep_until(deadline).await;
                        return Err(FetchFailure::Budget);
                    }
                    _ => sleep(delay).await,
                }
            }
        }

        let detail = last_error.map(|e| e.to_string()).unwrap_or_default();
        Err(FetchFailure::Exhausted(format!(
            "page {} fetch failed after {} attempts: {}",
            page, attempts, detail
        )))
    }

    /// Hands new results to the sink, then advances and saves the cursor
    ///
    /// At most one cursor write happens per page. The cursor only moves
    /// forward: the page's newest item is applied only when it lies beyond
    /// the current position.
    fn persist_page(
        &self,
        session: &CrawlSession,
        fresh: &[CrawlResult],
        next_token: Option<&str>,
        ledger: &mut RunLedger,
    ) -> Result<(), StorageError> {
        if !fresh.is_empty() {
            ledger.persisted += self.sink.accept(fresh, &session.metrics)?;
        }

        let current = match &ledger.cursor {
            Some(cursor) => cursor.clone(),
            None => return Ok(()),
        };

        let mut next = current.with_next_page_token(next_token);
        if let Some(newest) = newest(fresh) {
            if next.is_after(Some(newest.posted_at), Some(&newest.external_id)) {
                next = next.advance_to(Some(newest.posted_at), Some(&newest.external_id));
            }
        }

        if next != current {
            let saved = self.cursors.save(&next)?;
            tracing::debug!(session = %session.id, cursor = %saved.key, "Cursor advanced");
            ledger.cursor = Some(saved);
        }
        Ok(())
    }
}

/// The item with the latest posted-at; the earliest such item wins ties
fn newest(results: &[CrawlResult]) -> Option<&CrawlResult> {
    results.iter().fold(None, |best: Option<&CrawlResult>, r| match best {
        Some(b) if b.posted_at >= r.posted_at => Some(b),
        _ => Some(r),
    })
}

fn finish(session: CrawlSession, ledger: RunLedger) -> CrawlOutcome {
    CrawlOutcome {
        session_id: session.id,
        blueprint_code: session.blueprint.code.clone(),
        source_code: session.context.source_code.clone(),
        state: session.state,
        results: ledger.results,
        metrics: session.metrics,
        results_persisted: ledger.persisted,
        failure_reason: ledger.failure_reason,
        timed_out: ledger.timed_out,
        cursor: ledger.cursor,
        persistence_error: ledger.persistence_error,
        started_at: session.started_at,
        finished_at: Utc::now(),
    }
}
