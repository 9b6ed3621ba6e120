//! State module for tracking crawl sessions and enrichment work
//!
//! # Components
//!
//! - `SessionState`: Where a crawl session is in its fetch/parse/advance cycle
//! - `EnrichmentStatus`: Lifecycle of a deferred enrichment row

mod enrichment_status;
mod session_state;

// Re-export main types
pub use enrichment_status::EnrichmentStatus;
pub use session_state::SessionState;
