//! Pagination driver
//!
//! Pagination state is a plain value. The driver never mutates it; each step
//! produces the next request or a stop signal carrying the final state.

use crate::crawler::context::CrawlContext;

/// Position of a session within a paginated source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPagination {
    /// 1-based index of the page to fetch
    pub page: u32,
    pub page_size: u32,
    pub pages_fetched: u32,
    pub max_pages: u32,
    pub has_more: bool,
    /// Continuation token returned by the previous page
    pub next_token: Option<String>,
}

impl CrawlPagination {
    /// State before the first page of a session
    pub fn first(page_size: u32, max_pages: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            pages_fetched: 0,
            max_pages: max_pages.max(1),
            has_more: true,
            next_token: None,
        }
    }

    /// Item offset of the current page
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// Everything the fetch capability needs to load one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPageRequest {
    pub blueprint_code: String,
    pub context: CrawlContext,
    pub pagination: CrawlPagination,
}

/// What the session learned from the page it just processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOutcome {
    /// Items not seen before in this session or by the cursor
    pub new_items: usize,
    /// Whether the source claims further pages exist
    pub has_more: bool,
    pub next_token: Option<String>,
}

/// Why pagination ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source signalled the end of results
    Exhausted,
    /// The configured page cap was reached
    PageCap,
    /// The last page produced nothing new
    NoNewItems,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "source exhausted",
            Self::PageCap => "page cap reached",
            Self::NoNewItems => "no new items",
        }
    }
}

/// Result of one pagination step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    Next(CrawlPageRequest),
    Stop {
        pagination: CrawlPagination,
        reason: StopReason,
    },
}

/// Computes page requests from pagination state
pub struct PaginationDriver;

impl PaginationDriver {
    /// Builds the request for the first page of a session
    pub fn initial(
        blueprint_code: &str,
        context: &CrawlContext,
        page_size: u32,
        max_pages: u32,
    ) -> CrawlPageRequest {
        CrawlPageRequest {
            blueprint_code: blueprint_code.to_string(),
            context: context.clone(),
            pagination: CrawlPagination::first(page_size, max_pages),
        }
    }

    /// Decides whether to fetch another page after `current`
    ///
    /// The page just processed is counted as fetched. Pagination continues
    /// only while the source has more, the cap is not reached, and the page
    /// yielded at least one new item. A page with nothing new stops the
    /// session even when the source claims more pages; this guards against
    /// sources that loop or repeat content, but it will also stop early on
    /// sources that repeat pinned listings mid-stream.
    pub fn next(current: &CrawlPageRequest, outcome: &PageOutcome) -> Continuation {
        let prev = &current.pagination;
        let pages_fetched = prev.pages_fetched.saturating_add(1).min(prev.max_pages);
        let cap_reached = pages_fetched >= prev.max_pages;

        let pagination = CrawlPagination {
            pages_fetched,
            has_more: outcome.has_more && !cap_reached,
            next_token: outcome.next_token.clone(),
            ..prev.clone()
        };

        let reason = if !outcome.has_more {
            Some(StopReason::Exhausted)
        } else if cap_reached {
            Some(StopReason::PageCap)
        } else if outcome.new_items == 0 {
            Some(StopReason::NoNewItems)
        } else {
            None
        };

        match reason {
            Some(reason) => Continuation::Stop { pagination, reason },
            None => Continuation::Next(CrawlPageRequest {
                blueprint_code: current.blueprint_code.clone(),
                context: current.context.clone(),
                pagination: CrawlPagination {
                    page: pagination.page.saturating_add(1),
                    ..pagination
                },
            }),
        }
    }
}
