use crate::crawler::blueprint::CrawlBlueprint;
use crate::crawler::context::CrawlContext;
use crate::crawler::engine::CrawlResult;
use crate::crawler::pagination::CrawlPagination;
use crate::ingest::IngestionCursor;
use crate::state::SessionState;
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Counters collected over one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlMetrics {
    pub pages_fetched: u32,
    /// Items that survived normalization
    pub items_parsed: u64,
    /// Items dropped as already seen or behind the cursor
    pub items_skipped: u64,
    /// Failed fetch attempts, including ones that were retried
    pub fetch_errors: u32,
    pub parse_errors: u32,
}

/// Live state of one blueprint run
#[derive(Debug, Clone)]
pub struct CrawlSession {
    pub id: Uuid,
    pub blueprint: Arc<CrawlBlueprint>,
    pub context: CrawlContext,
    pub pagination: CrawlPagination,
    pub metrics: CrawlMetrics,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
}

impl CrawlSession {
    pub fn new(blueprint: Arc<CrawlBlueprint>, context: CrawlContext) -> Self {
        let pagination = CrawlPagination::first(blueprint.paging.page_size, blueprint.paging.max_pages);
        Self {
            id: Uuid::new_v4(),
            blueprint,
            context,
            pagination,
            metrics: CrawlMetrics::default(),
            state: SessionState::Init,
            started_at: Utc::now(),
        }
    }

    /// Moves the session to `next`
    ///
    /// Illegal transitions are logged and ignored, so a terminal session
    /// stays terminal.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                session = %self.id,
                from = self.state.as_str(),
                to = next.as_str(),
                "Ignoring illegal session transition"
            );
            return false;
        }
        tracing::trace!(session = %self.id, from = self.state.as_str(), to = next.as_str(), "Session transition");
        self.state = next;
        true
    }
}

/// Final report of a finished session
#[derive(Debug)]
pub struct CrawlOutcome {
    pub session_id: Uuid,
    pub blueprint_code: String,
    pub source_code: String,
    /// Always DONE or FAILED
    pub state: SessionState,
    /// Every normalized, new result in page order
    pub results: Vec<CrawlResult>,
    pub metrics: CrawlMetrics,
    pub results_persisted: usize,
    pub failure_reason: Option<String>,
    pub timed_out: bool,
    /// Cursor as left by the session, if one was loaded
    pub cursor: Option<IngestionCursor>,
    /// Sink or cursor store failure that ended the session
    pub persistence_error: Option<StorageError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CrawlOutcome {
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Done
    }
}
