//! Crawler module for paginated career-site crawling
//!
//! This module contains the core crawling logic, including:
//! - Blueprints with their paging strategies and parsing rules
//! - HTTP fetching behind the `PageFetcher` capability
//! - Selector parsing and result normalization
//! - The pagination driver and the session controller
//! - A bounded worker pool for concurrent sessions

mod blueprint;
mod context;
mod controller;
mod engine;
mod fetcher;
mod pagination;
mod parser;
mod pool;
mod session;

pub use blueprint::{BlueprintRegistry, CrawlBlueprint, PagingStrategy};
pub use context::CrawlContext;
pub use controller::{SessionController, BUDGET_REASON, DISABLED_REASON};
pub use engine::{normalize_tags, CrawlResult, ParserEngine};
pub use fetcher::{build_http_client, CrawlPageSnapshot, HttpPageFetcher, PageFetcher};
pub use pagination::{
    Continuation, CrawlPageRequest, CrawlPagination, PageOutcome, PaginationDriver, StopReason,
};
pub use parser::{ParsedJob, ParsingRules, SelectorRules};
pub use pool::{SessionHandle, WorkerPool};
pub use session::{CrawlMetrics, CrawlOutcome, CrawlSession};
