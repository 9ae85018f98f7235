//! Completion and webhook processing
//!
//! Completion events are serialized per instance through bounded FIFO
//! channels, one worker task per channel. Jobs for the same instance never
//! overlap; different instances run concurrently. A rate-limited job sleeps
//! and retries itself; any other failure closes the job as failed.
//!
//! Webhook-triggered adds bypass the queues entirely: the HTTP caller
//! already serializes them.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::CrossSeedError;
use crate::executor::{CrossSeedOptions, InstanceCrossSeedResult};
use crate::search::completion_retry_delay;
use crate::service::CrossSeedService;

/// One completed torrent to search cross-seeds for
#[derive(Debug, Clone)]
pub struct CompletionJob {
    pub instance_id: i64,
    pub torrent_hash: String,
    pub enqueued_at: DateTime<Utc>,
}

impl CompletionJob {
    pub fn new(instance_id: i64, torrent_hash: impl Into<String>) -> Self {
        Self {
            instance_id,
            torrent_hash: torrent_hash.into(),
            enqueued_at: Utc::now(),
        }
    }
}

/// The work a completion job performs (a C7 search plus C6 executions)
pub type CompletionInvoker =
    Arc<dyn Fn(CompletionJob) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Per-instance FIFO queues with one worker task per instance
pub struct CompletionQueues {
    invoker: CompletionInvoker,
    capacity: usize,
    senders: Mutex<HashMap<i64, mpsc::Sender<CompletionJob>>>,
}

impl CompletionQueues {
    pub fn new(invoker: CompletionInvoker, capacity: usize) -> Self {
        Self {
            invoker,
            capacity: capacity.max(1),
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue a completion job; the instance's queue and worker are
    /// created on first use.
    ///
    /// Returns false when the queue is full; the job is dropped with a
    /// warning and the caller may re-enqueue later.
    pub fn enqueue(&self, job: CompletionJob) -> bool {
        let sender = {
            let mut senders = self.senders.lock();
            senders
                .entry(job.instance_id)
                .or_insert_with(|| self.spawn_worker(job.instance_id))
                .clone()
        };

        match sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    instance_id = job.instance_id,
                    hash = %job.torrent_hash,
                    "Completion queue full; dropping job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                // The worker died; replace it and retry once
                warn!(instance_id = job.instance_id, "Completion worker gone; respawning");
                let sender = {
                    let mut senders = self.senders.lock();
                    let sender = self.spawn_worker(job.instance_id);
                    senders.insert(job.instance_id, sender.clone());
                    sender
                };
                sender.try_send(job).is_ok()
            }
        }
    }

    fn spawn_worker(&self, instance_id: i64) -> mpsc::Sender<CompletionJob> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let invoker = self.invoker.clone();
        tokio::spawn(worker_loop(instance_id, rx, invoker));
        tx
    }
}

/// Drain one instance's queue strictly in order. A job retries itself for
/// as long as the errors look like rate limiting; anything else logs and
/// moves on.
async fn worker_loop(
    instance_id: i64,
    mut rx: mpsc::Receiver<CompletionJob>,
    invoker: CompletionInvoker,
) {
    info!(instance_id, "Completion worker started");
    while let Some(job) = rx.recv().await {
        loop {
            match invoker(job.clone()).await {
                Ok(()) => {
                    debug!(
                        instance_id,
                        hash = %job.torrent_hash,
                        "Completion job finished"
                    );
                    break;
                }
                Err(e) => match completion_retry_delay(&e) {
                    Some(delay) => {
                        warn!(
                            instance_id,
                            hash = %job.torrent_hash,
                            delay = ?delay,
                            error = %e,
                            "Completion job rate-limited; retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(
                            instance_id,
                            hash = %job.torrent_hash,
                            error = %e,
                            "Completion job failed"
                        );
                        break;
                    }
                },
            }
        }
    }
    info!(instance_id, "Completion worker stopped");
}

/// An Autobrr webhook request: raw torrent bytes plus caller overrides.
/// Unset options fall back to the stored automation settings.
#[derive(Debug, Clone, Default)]
pub struct AutobrrApplyRequest {
    pub torrent_bytes: Vec<u8>,
    pub release_name: Option<String>,
    pub tracker_display: Option<String>,
    /// Target instances; empty means every enabled instance
    pub instance_ids: Vec<i64>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub find_individual_episodes: Option<bool>,
    pub start_paused: Option<bool>,
    pub skip_if_exists: Option<bool>,
}

/// Handle a webhook-triggered add: merge caller options with the stored
/// automation defaults and invoke the cross-seed path directly.
pub async fn autobrr_apply(
    db: &Database,
    service: &CrossSeedService,
    request: AutobrrApplyRequest,
) -> Result<Vec<InstanceCrossSeedResult>> {
    if request.torrent_bytes.is_empty() {
        return Err(CrossSeedError::InvalidRequest("empty torrent payload".to_string()).into());
    }

    // Named instances must exist; a typo is a configuration error, not a
    // silent no-op
    if !request.instance_ids.is_empty() {
        let known = db.instances().list_enabled().await?;
        for id in &request.instance_ids {
            if !known.iter().any(|i| i.id == *id) {
                return Err(
                    CrossSeedError::WebhookInstanceNotFound(id.to_string()).into()
                );
            }
        }
    }

    let settings = db.settings().get().await?;
    let mut options = CrossSeedOptions::from_settings(&settings);
    options.category = request.category.clone();
    options.tags = request.tags.clone();
    if let Some(find_episodes) = request.find_individual_episodes {
        options.find_individual_episodes = find_episodes;
    }
    if let Some(start_paused) = request.start_paused {
        options.start_paused = start_paused;
    }
    if let Some(skip_if_exists) = request.skip_if_exists {
        options.skip_if_exists = skip_if_exists;
    }

    info!(
        release = request.release_name.as_deref().unwrap_or("<from metainfo>"),
        instances = request.instance_ids.len(),
        "Webhook cross-seed apply"
    );

    service
        .cross_seed(
            request.torrent_bytes,
            request.release_name,
            request.tracker_display,
            &request.instance_ids,
            options,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_invoker(
        counter: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<String>>>,
    ) -> CompletionInvoker {
        Arc::new(move |job: CompletionJob| {
            let counter = counter.clone();
            let order = order.clone();
            Box::pin(async move {
                // Hold each job briefly so overlap would be observable
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                order.lock().push(job.torrent_hash.clone());
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order_per_instance() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let queues = CompletionQueues::new(counting_invoker(counter.clone(), order.clone()), 16);

        for i in 0..5 {
            assert!(queues.enqueue(CompletionJob::new(1, format!("hash-{}", i))));
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) < 5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("all jobs processed");

        let seen = order.lock().clone();
        assert_eq!(seen, vec!["hash-0", "hash-1", "hash-2", "hash-3", "hash-4"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_with_false() {
        // Invoker that never finishes, so the queue cannot drain
        let invoker: CompletionInvoker = Arc::new(|_job| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
        });
        let queues = CompletionQueues::new(invoker, 1);

        // First job is picked up by the worker, second fills the buffer
        assert!(queues.enqueue(CompletionJob::new(1, "a")));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queues.enqueue(CompletionJob::new(1, "b")));
        assert!(!queues.enqueue(CompletionJob::new(1, "c")));
    }

    #[tokio::test]
    async fn test_rate_limited_job_retries_itself() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_for_invoker = attempts.clone();
        let invoker: CompletionInvoker = Arc::new(move |_job| {
            let attempts = attempts_for_invoker.clone();
            Box::pin(async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(crate::error::RateLimitWaitError {
                        indexer_id: 1,
                        indexer_name: "idx".to_string(),
                        wait: Duration::from_millis(10),
                        max_wait: Duration::from_millis(10),
                        priority: 0,
                    }
                    .into())
                } else {
                    Ok(())
                }
            })
        });
        let queues = CompletionQueues::new(invoker, 4);
        assert!(queues.enqueue(CompletionJob::new(7, "retry-me")));

        tokio::time::timeout(Duration::from_secs(2), async {
            while attempts.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job retried after the rate-limit delay");
    }

    #[tokio::test]
    async fn test_instances_get_separate_workers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let queues = CompletionQueues::new(counting_invoker(counter.clone(), order), 4);

        assert!(queues.enqueue(CompletionJob::new(1, "a")));
        assert!(queues.enqueue(CompletionJob::new(2, "b")));

        tokio::time::timeout(Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both instances processed");
    }
}
