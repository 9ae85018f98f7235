//! Indexer cooldown registry and rate-limit error inspection
//!
//! Cooldowns live in memory for speed and in the database for restart
//! survival; every indexer call consults the registry before issuing.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::RateLimitWaitError;

/// Delay used when an error only textually indicates rate limiting
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Error fragments that mean "the indexer wants a pause"
const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate-limited",
    "rate limited",
    "cooldown",
    "indexer query limit of",
    "indexer grab limit",
    "request limit reached",
    "too many requests",
];

/// Registry of per-indexer cooldowns, memory-first with persistence
pub struct CooldownRegistry {
    db: Database,
    active: Mutex<HashMap<i64, DateTime<Utc>>>,
}

impl CooldownRegistry {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Load persisted cooldowns so a restart keeps honoring them
    pub async fn load(&self) -> Result<()> {
        let rows = self.db.rate_limits().active_cooldowns().await?;
        let mut active = self.active.lock();
        for (indexer_id, until) in rows {
            active.insert(indexer_id, until);
        }
        debug!(cooldowns = active.len(), "Loaded indexer cooldowns");
        Ok(())
    }

    /// Remaining cooldown for an indexer, if any
    pub fn remaining(&self, indexer_id: i64) -> Option<Duration> {
        let mut active = self.active.lock();
        let until = *active.get(&indexer_id)?;
        let now = Utc::now();
        if until <= now {
            active.remove(&indexer_id);
            return None;
        }
        (until - now).to_std().ok()
    }

    /// Record a cooldown in memory and persist it
    pub async fn apply(&self, indexer_id: i64, wait: Duration, reason: &str) {
        let until = Utc::now() + chrono::Duration::from_std(wait).unwrap_or_default();
        self.active.lock().insert(indexer_id, until);
        if let Err(e) = self
            .db
            .rate_limits()
            .set_cooldown(indexer_id, until, reason)
            .await
        {
            warn!(indexer_id, error = %e, "Could not persist indexer cooldown");
        }
    }

    /// Record the cooldown a rate-limit error asks for
    pub async fn apply_error(&self, err: &RateLimitWaitError) {
        self.apply(err.indexer_id, err.effective_wait(), &err.to_string())
            .await;
    }
}

/// Retry a transient operation with exponential backoff.
///
/// Rate-limit errors are not retried here; they carry their own wait and
/// belong to the cooldown registry.
pub async fn retry_transient<T, Fut, F>(operation: F, operation_name: &str) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        max_interval: Duration::from_secs(10),
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..Default::default()
    };

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if RateLimitWaitError::find_in(&e).is_some() {
                    return Err(e);
                }
                match backoff.next_backoff() {
                    Some(delay) => {
                        warn!(
                            operation = %operation_name,
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Operation failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                }
            }
        }
    }
}

/// Retry delay for a completion-queue job whose processing hit rate
/// pressure; `None` means the error is not a rate limit and the job fails.
pub fn completion_retry_delay(err: &anyhow::Error) -> Option<Duration> {
    if let Some(wait) = RateLimitWaitError::find_in(err) {
        return Some(wait.effective_wait());
    }

    let message = format!("{:#}", err).to_lowercase();
    RATE_LIMIT_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
        .then_some(DEFAULT_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_phrase_detection() {
        let err = anyhow!("indexer query limit of 100 in last 24h reached");
        assert_eq!(completion_retry_delay(&err), Some(DEFAULT_RETRY_DELAY));

        let err = anyhow!("request limit reached, slow down");
        assert!(completion_retry_delay(&err).is_some());

        let err = anyhow!("connection refused");
        assert!(completion_retry_delay(&err).is_none());
    }

    #[test]
    fn test_distinguished_error_wins_over_phrases() {
        let err = anyhow::Error::new(RateLimitWaitError {
            indexer_id: 1,
            indexer_name: "idx".to_string(),
            wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
            priority: 0,
        });
        assert_eq!(completion_retry_delay(&err), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_registry_remaining_and_expiry() {
        let db = Database::connect_in_memory().await.unwrap();
        let registry = CooldownRegistry::new(db);

        assert!(registry.remaining(7).is_none());

        registry.apply(7, Duration::from_secs(120), "test").await;
        let remaining = registry.remaining(7).expect("cooldown active");
        assert!(remaining <= Duration::from_secs(120));

        registry.apply(8, Duration::from_secs(0), "instant").await;
        assert!(registry.remaining(8).is_none());
    }

    #[tokio::test]
    async fn test_registry_reload_from_database() {
        let db = Database::connect_in_memory().await.unwrap();
        let registry = CooldownRegistry::new(db.clone());
        registry.apply(3, Duration::from_secs(300), "429").await;

        let reloaded = CooldownRegistry::new(db);
        reloaded.load().await.unwrap();
        assert!(reloaded.remaining(3).is_some());
    }
}
