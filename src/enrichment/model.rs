use crate::state::EnrichmentStatus;
use chrono::{DateTime, Utc};
use std::fmt;

/// Kind of deferred enrichment attached to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentKey {
    Status,
    Summary,
    Skills,
    Highlights,
    StructuredData,
}

impl EnrichmentKey {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Status => "STATUS",
            Self::Summary => "SUMMARY",
            Self::Skills => "SKILLS",
            Self::Highlights => "HIGHLIGHTS",
            Self::StructuredData => "STRUCTURED_DATA",
        }
    }

    /// Parses a key, ignoring case and accepting `-` for `_`
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "STATUS" => Some(Self::Status),
            "SUMMARY" => Some(Self::Summary),
            "SKILLS" => Some(Self::Skills),
            "HIGHLIGHTS" => Some(Self::Highlights),
            "STRUCTURED_DATA" => Some(Self::StructuredData),
            _ => None,
        }
    }
}

impl fmt::Display for EnrichmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One enrichment work item
#[derive(Debug, Clone, PartialEq)]
pub struct JobDetailEnrichment {
    pub id: i64,
    pub job_id: i64,
    pub key: EnrichmentKey,
    pub status: EnrichmentStatus,
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobDetailEnrichment {
    /// Returns true if the row was attempted after `cutoff`
    pub fn attempted_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_attempt_at.map(|at| at > cutoff).unwrap_or(false)
    }
}
