//! Deferred enrichment of ingested jobs
//!
//! This module contains:
//! - The enrichment row model and its kinds
//! - The exponential retry backoff policy
//! - The retry scheduler with its compare-and-set claim protocol

mod backoff;
mod model;
mod scheduler;

pub use backoff::RetryBackoff;
pub use model::{EnrichmentKey, JobDetailEnrichment};
pub use scheduler::{DispatchError, DispatchReport, EnrichmentProcessor, EnrichmentRetryScheduler};
