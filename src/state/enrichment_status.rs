/// Enrichment status definitions
///
/// Status values are stored as strings in the enrichment table and compared
/// verbatim by the claim protocol.
use std::fmt;

/// Lifecycle state of a deferred enrichment row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentStatus {
    /// Created, never attempted
    Pending,

    /// A previous attempt failed and a retry time has been set
    RetryScheduled,

    /// Claimed by a worker and handed to the processor
    Retrying,

    /// Enrichment completed
    Done,

    /// Enrichment gave up after exhausting attempts
    Failed,
}

impl EnrichmentStatus {
    /// Returns true if the retry scheduler may pick this row up
    pub fn is_retry_eligible(&self) -> bool {
        matches!(self, Self::Pending | Self::RetryScheduled)
    }

    /// Returns true if the processor has written a final outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::RetryScheduled => "RETRY_SCHEDULED",
            Self::Retrying => "RETRYING",
            Self::Done => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RETRY_SCHEDULED" => Some(Self::RetryScheduled),
            "RETRYING" => Some(Self::Retrying),
            "SUCCESS" => Some(Self::Done),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
