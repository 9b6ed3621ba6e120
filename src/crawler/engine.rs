//! Normalization of parsed jobs into crawl results

use crate::crawler::fetcher::CrawlPageSnapshot;
use crate::crawler::parser::{collapse_whitespace, ParsedJob};
use crate::crawler::session::CrawlSession;
use crate::ParseError;
use chrono::{DateTime, Utc};
use scraper::Html;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A normalized job posting ready for the sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlResult {
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub level: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub url: Option<String>,
    /// Plain-text description
    pub description: Option<String>,
    /// Description as extracted, usually HTML
    pub raw_description: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// Applies a blueprint's rules to a snapshot and normalizes the output
pub struct ParserEngine;

impl ParserEngine {
    pub fn parse(session: &CrawlSession, snapshot: &CrawlPageSnapshot) -> Result<Vec<CrawlResult>, ParseError> {
        Self::parse_at(session, snapshot, Utc::now())
    }

    /// Same as [`ParserEngine::parse`] with a fixed clock for missing dates
    pub fn parse_at(
        session: &CrawlSession,
        snapshot: &CrawlPageSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Vec<CrawlResult>, ParseError> {
        let jobs = session.blueprint.rules.parse(&snapshot.content, &snapshot.url)?;
        let source = session.context.resolved_source_name();

        Ok(jobs
            .into_iter()
            .filter_map(|job| normalize(job, session, snapshot, &source, now))
            .collect())
    }
}

fn normalize(
    job: ParsedJob,
    session: &CrawlSession,
    snapshot: &CrawlPageSnapshot,
    source: &str,
    now: DateTime<Utc>,
) -> Option<CrawlResult> {
    let title = trimmed(job.title)?;
    let external_id = trimmed(job.external_id).unwrap_or_else(|| title.clone());

    let company = trimmed(job.company).or_else(|| session.context.company_override().map(str::to_string));

    let raw_description = trimmed(job.description);
    let description = raw_description.as_deref().map(html_to_text).filter(|d| !d.is_empty());

    let mut metadata = job.extra;
    metadata.insert("blueprint".to_string(), Value::String(session.blueprint.code.clone()));
    metadata.insert("page".to_string(), Value::from(session.pagination.page));
    metadata.insert("page_url".to_string(), Value::String(snapshot.url.clone()));
    if !session.context.category.is_empty() {
        metadata.insert("category".to_string(), Value::String(session.context.category.clone()));
    }

    Some(CrawlResult {
        source: source.to_string(),
        external_id,
        title,
        company,
        location: trimmed(job.location),
        level: trimmed(job.level),
        posted_at: job.posted_at.unwrap_or(now),
        url: trimmed(job.url),
        description,
        raw_description,
        tags: normalize_tags(job.tags),
        metadata,
    })
}

/// Trims and lowercases tags, dropping blanks and later duplicates
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn html_to_text(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    collapse_whitespace(fragment.root_element().text())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
