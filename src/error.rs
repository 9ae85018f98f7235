//! Error kinds distinguished across the cross-seed engine
//!
//! Most services return `anyhow::Result`; the variants here are the handful
//! of conditions callers branch on. They travel inside `anyhow::Error` and
//! are recovered with `downcast_ref`.

use std::time::Duration;

use thiserror::Error;

/// Errors the engine distinguishes beyond a plain failure
#[derive(Debug, Error)]
pub enum CrossSeedError {
    /// The caller violated a precondition; surfaced, never retried
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The referenced client instance is not configured
    #[error("instance {0} not found")]
    InstanceNotFound(i64),

    /// A webhook named an instance that is not configured
    #[error("webhook instance '{0}' not found")]
    WebhookInstanceNotFound(String),

    /// Transient client/HTTP failure; retried once where the flow allows
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// A link plan cannot be satisfied (missing non-ignorable files,
    /// size tolerance exceeded, unusable destination)
    #[error("link plan infeasible: {0}")]
    PlanInfeasible(String),

    /// Link creation or the filesystem probe failed; the plan was rolled back
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// The operation was cancelled via its context token
    #[error("operation cancelled")]
    Cancelled,
}

impl CrossSeedError {
    /// Whether an error chain bottoms out in this distinguished kind
    pub fn find_in(err: &anyhow::Error) -> Option<&CrossSeedError> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<CrossSeedError>())
    }
}

/// Distinguished rate-limit error raised by indexer backends.
///
/// Carries the wait the indexer asked for so the orchestrator can back off
/// for exactly that long instead of guessing.
#[derive(Debug, Clone, Error)]
#[error("indexer '{indexer_name}' rate-limited, wait {wait:?} (max {max_wait:?})")]
pub struct RateLimitWaitError {
    pub indexer_id: i64,
    pub indexer_name: String,
    pub wait: Duration,
    pub max_wait: Duration,
    pub priority: u8,
}

impl RateLimitWaitError {
    /// The bounded wait to actually sleep before retrying
    pub fn effective_wait(&self) -> Duration {
        self.wait.min(self.max_wait)
    }

    /// Whether an error chain bottoms out in a rate-limit wait
    pub fn find_in(err: &anyhow::Error) -> Option<&RateLimitWaitError> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<RateLimitWaitError>())
    }
}
