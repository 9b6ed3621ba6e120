//! Ingestion cursor value types
//!
//! A cursor remembers how far a source has been ingested so that the next run
//! only picks up postings it has not seen. Cursors are plain values: every
//! update returns a new cursor and leaves the original untouched.

use crate::crawler::CrawlResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a cursor row
///
/// All four parts are trimmed and null-coalesced to the empty string on
/// construction. Normalization does not change case: `"Acme"` and `"acme"`
/// are different companies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IngestionCursorKey {
    source_code: String,
    source_name: String,
    company: String,
    category: String,
}

impl IngestionCursorKey {
    pub fn new(
        source_code: impl AsRef<str>,
        source_name: impl AsRef<str>,
        company: impl AsRef<str>,
        category: impl AsRef<str>,
    ) -> Self {
        Self {
            source_code: source_code.as_ref().trim().to_string(),
            source_name: source_name.as_ref().trim().to_string(),
            company: company.as_ref().trim().to_string(),
            category: category.as_ref().trim().to_string(),
        }
    }

    /// Builds a key from parts that may be absent
    pub fn from_optional(
        source_code: Option<&str>,
        source_name: Option<&str>,
        company: Option<&str>,
        category: Option<&str>,
    ) -> Self {
        Self::new(
            source_code.unwrap_or_default(),
            source_name.unwrap_or_default(),
            company.unwrap_or_default(),
            category.unwrap_or_default(),
        )
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Returns true if both keys name the same cursor row
    pub fn matches(&self, other: &IngestionCursorKey) -> bool {
        self == other
    }
}

impl std::fmt::Display for IngestionCursorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.source_code, self.source_name, self.company, self.category
        )
    }
}

/// Resumption marker for one source/company/category combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionCursor {
    /// Row id once persisted
    pub id: Option<i64>,
    pub key: IngestionCursorKey,
    pub last_posted_at: Option<DateTime<Utc>>,
    pub last_external_id: Option<String>,
    pub next_page_token: Option<String>,
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub create_time: Option<DateTime<Utc>>,
}

impl IngestionCursor {
    /// Creates a cursor with no position for the given key
    pub fn empty(key: IngestionCursorKey) -> Self {
        Self {
            id: None,
            key,
            last_posted_at: None,
            last_external_id: None,
            next_page_token: None,
            last_ingested_at: None,
            create_time: None,
        }
    }

    /// Returns true if the cursor remembers a posting
    pub fn has_position(&self) -> bool {
        self.last_posted_at.is_some() || !is_blank(self.last_external_id.as_deref())
    }

    /// Returns a cursor carrying `token` as the continuation token
    ///
    /// An unchanged token yields an identical cursor.
    pub fn with_next_page_token(&self, token: Option<&str>) -> Self {
        if self.next_page_token.as_deref() == token {
            return self.clone();
        }
        Self {
            next_page_token: token.map(str::to_string),
            ..self.clone()
        }
    }

    /// Moves the cursor to a new position, stamped with the current time
    pub fn advance_to(&self, posted_at: Option<DateTime<Utc>>, external_id: Option<&str>) -> Self {
        self.advance_to_at(Utc::now(), posted_at, external_id)
    }

    /// Moves the cursor to a new position, stamped with `now`
    ///
    /// With neither a timestamp nor a non-blank id there is nothing to record
    /// and the cursor is returned unchanged.
    pub fn advance_to_at(
        &self,
        now: DateTime<Utc>,
        posted_at: Option<DateTime<Utc>>,
        external_id: Option<&str>,
    ) -> Self {
        if posted_at.is_none() && is_blank(external_id) {
            return self.clone();
        }
        Self {
            last_posted_at: posted_at,
            last_external_id: external_id.map(str::to_string),
            last_ingested_at: Some(now),
            create_time: Some(self.create_time.unwrap_or(now)),
            ..self.clone()
        }
    }

    /// Returns true if a posting lies beyond this cursor
    ///
    /// Missing timestamps on either side count as new. Equal timestamps are
    /// ordered by external id, and a blank id on either side counts as new.
    pub fn is_after(&self, posted_at: Option<DateTime<Utc>>, external_id: Option<&str>) -> bool {
        if !self.has_position() {
            return true;
        }
        let (candidate, last) = match (posted_at, self.last_posted_at) {
            (Some(candidate), Some(last)) => (candidate, last),
            _ => return true,
        };
        if candidate > last {
            return true;
        }
        if candidate < last {
            return false;
        }
        match (external_id, self.last_external_id.as_deref()) {
            (Some(candidate), Some(last)) if !candidate.trim().is_empty() && !last.trim().is_empty() => {
                candidate > last
            }
            _ => true,
        }
    }

    /// Keeps only the results beyond this cursor
    pub fn filter_new<'a>(&self, results: &'a [CrawlResult]) -> Vec<&'a CrawlResult> {
        results
            .iter()
            .filter(|r| self.is_after(Some(r.posted_at), Some(&r.external_id)))
            .collect()
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn cursor() -> IngestionCursor {
        IngestionCursor::empty(IngestionCursorKey::new("ashby", "Ashby", "Acme", ""))
    }

    #[test]
    fn test_key_trims_and_coalesces() {
        let a = IngestionCursorKey::from_optional(Some("  Ashby"), Some(""), Some("Acme Corp "), None);
        let b = IngestionCursorKey::new("Ashby", "", "Acme Corp", "");

        assert!(a.matches(&b));
        assert_eq!(a.category(), "");
        assert_eq!(a.company(), "Acme Corp");
    }

    #[test]
    fn test_key_is_case_sensitive() {
        let upper = IngestionCursorKey::new("ashby", "", "Acme", "");
        let lower = IngestionCursorKey::new("ashby", "", "acme", "");
        assert!(!upper.matches(&lower));

        let code_upper = IngestionCursorKey::from_optional(Some("  Ashby"), None, Some("Acme Corp "), None);
        let code_lower = IngestionCursorKey::from_optional(Some("ashby"), None, Some("Acme Corp"), None);
        assert_ne!(code_upper, code_lower);
    }

    #[test]
    fn test_advance_without_position_is_noop() {
        let advanced = cursor().advance_to_at(ts(1), Some(ts(2)), Some("job-1"));

        assert_eq!(advanced.advance_to(None, Some("")), advanced);
        assert_eq!(advanced.advance_to(None, Some("   ")), advanced);
        assert_eq!(advanced.advance_to(None, None), advanced);
        assert_eq!(cursor().advance_to(None, None), cursor());
    }

    #[test]
    fn test_advance_sets_position_and_preserves_create_time() {
        let first = cursor().advance_to_at(ts(1), Some(ts(5)), Some("job-1"));
        assert_eq!(first.create_time, Some(ts(1)));
        assert_eq!(first.last_ingested_at, Some(ts(1)));
        assert_eq!(first.last_external_id.as_deref(), Some("job-1"));

        let second = first.advance_to_at(ts(3), Some(ts(6)), Some("job-2"));
        assert_eq!(second.create_time, Some(ts(1)));
        assert_eq!(second.last_ingested_at, Some(ts(3)));
        assert_eq!(second.last_posted_at, Some(ts(6)));
    }

    #[test]
    fn test_advance_with_only_external_id() {
        let advanced = cursor().advance_to_at(ts(1), None, Some("job-9"));
        assert!(advanced.has_position());
        assert_eq!(advanced.last_posted_at, None);
    }

    #[test]
    fn test_with_next_page_token_is_idempotent() {
        let once = cursor().with_next_page_token(Some("abc"));
        let twice = once.with_next_page_token(Some("abc"));

        assert_eq!(once.next_page_token.as_deref(), Some("abc"));
        assert_eq!(once, twice);

        let cleared = twice.with_next_page_token(None);
        assert_eq!(cleared.next_page_token, None);
        assert_eq!(cleared.key, once.key);
    }

    #[test]
    fn test_has_position() {
        assert!(!cursor().has_position());
        assert!(!cursor().with_next_page_token(Some("t")).has_position());
        assert!(cursor().advance_to_at(ts(1), Some(ts(1)), None).has_position());
    }

    #[test]
    fn test_is_after_ordering() {
        let c = cursor().advance_to_at(ts(0), Some(ts(10)), Some("m"));

        assert!(c.is_after(Some(ts(11)), Some("a")));
        assert!(!c.is_after(Some(ts(9)), Some("z")));
        assert!(c.is_after(Some(ts(10)), Some("n")));
        assert!(!c.is_after(Some(ts(10)), Some("m")));
        assert!(!c.is_after(Some(ts(10)), Some("a")));
        assert!(c.is_after(Some(ts(10)), Some(" ")));
        assert!(c.is_after(None, Some("a")));
        assert!(cursor().is_after(Some(ts(1)), Some("a")));
    }
}
