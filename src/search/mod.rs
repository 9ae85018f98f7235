//! Indexer search orchestration
//!
//! Bounded, cancellable search runs over the configured indexers, with
//! per-indexer rate limiting, cooldowns, deduplication, and persistent run
//! state. One background task owns each run; readers see snapshots through
//! the search-run repository.

pub mod orchestrator;
pub mod rate_limit;
pub mod score;

use serde::{Deserialize, Serialize};

pub use orchestrator::{SearchOrchestrator, SearchRunOptions, SearchTimingConfig};
pub use rate_limit::{CooldownRegistry, completion_retry_delay, retry_transient};
pub use score::{ReleaseMatchScore, evaluate_release_match};

/// Filters narrowing which completed torrents a run considers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Only torrents in one of these categories; empty means all
    pub categories: Vec<String>,
    /// Only torrents carrying one of these tags; empty means all
    pub tags: Vec<String>,
}

impl SearchFilters {
    /// Whether a torrent passes the filters
    pub fn accepts(&self, category: &str, tags: &[String]) -> bool {
        if !self.categories.is_empty() && !self.categories.iter().any(|c| c == category) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| tags.iter().any(|tag| tag == t)) {
            return false;
        }
        true
    }
}

/// Skip reason when the caller's indexer selection removed every indexer
/// that matched the candidate's content
pub const SELECTED_INDEXER_CONTENT_SKIP_REASON: &str =
    "selected indexers do not carry this content type";

/// Skip reason when the caller's indexer selection removed every indexer
/// capable of the search type
pub const SELECTED_INDEXER_CAPABILITY_SKIP_REASON: &str =
    "selected indexers do not support this search type";
