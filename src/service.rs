//! Cross-seed service facade
//!
//! Ties the resolver and executor together for callers that hold raw
//! torrent bytes: the Autobrr webhook, the completion queue, and the
//! search orchestrator all funnel through here.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::client::TorrentClient;
use crate::db::{AutomationSettings, Database, InstanceRecord};
use crate::error::CrossSeedError;
use crate::executor::{
    CrossSeedExecutor, CrossSeedOptions, CrossSeedRequest, CrossSeedStatus, ExecutorTiming,
    InstanceCrossSeedResult,
};
use crate::release::ReleaseCache;
use crate::resolver::{CandidateResolver, ResolveContext};
use crate::torrents::parse_torrent;

impl CrossSeedOptions {
    /// Defaults for fields the caller left unset, from the stored
    /// automation settings
    pub fn from_settings(settings: &AutomationSettings) -> Self {
        Self {
            category: None,
            tags: Vec::new(),
            ignore_patterns: settings.ignore_patterns.clone(),
            skip_if_exists: settings.skip_if_exists,
            start_paused: settings.start_paused,
            add_cross_seed_tag: settings.add_cross_seed_tag,
            size_tolerance_percent: settings.size_tolerance_percent,
            find_individual_episodes: settings.find_individual_episodes,
            using_indexer_category: false,
        }
    }
}

/// High-level entry point: one torrent in, one result per instance out
pub struct CrossSeedService {
    db: Database,
    cache: Arc<ReleaseCache>,
    resolver: CandidateResolver,
    executor: CrossSeedExecutor,
}

impl CrossSeedService {
    pub fn new(db: Database, client: Arc<dyn TorrentClient>, cache: Arc<ReleaseCache>) -> Self {
        Self {
            resolver: CandidateResolver::new(client.clone(), cache.clone()),
            executor: CrossSeedExecutor::new(client, cache.clone()),
            db,
            cache,
        }
    }

    pub fn with_timing(mut self, timing: ExecutorTiming) -> Self {
        self.executor = self.executor.with_timing(timing);
        self
    }

    pub fn cache(&self) -> &Arc<ReleaseCache> {
        &self.cache
    }

    /// Attempt to cross-seed raw torrent bytes onto the target instances
    /// (all enabled instances when none are named).
    ///
    /// One result per targeted instance; a failing instance yields an
    /// `error` result, never a missing row.
    pub async fn cross_seed(
        &self,
        torrent_bytes: Vec<u8>,
        name_hint: Option<String>,
        tracker_display: Option<String>,
        target_instance_ids: &[i64],
        options: CrossSeedOptions,
    ) -> Result<Vec<InstanceCrossSeedResult>> {
        let meta = parse_torrent(&torrent_bytes)?;
        let name = name_hint
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| meta.name.clone());
        let hash = meta.infohash_v1.clone();

        let instances = self.target_instances(target_instance_ids).await?;
        if instances.is_empty() {
            return Err(CrossSeedError::InvalidRequest(
                "no enabled instances to cross-seed onto".to_string(),
            )
            .into());
        }

        info!(
            name = %name,
            hash = %hash,
            instances = instances.len(),
            "Cross-seed attempt starting"
        );

        let ctx = ResolveContext::new();
        let candidates = self
            .resolver
            .find_candidates(
                &name,
                &instances,
                &options.ignore_patterns,
                options.find_individual_episodes,
                &ctx,
            )
            .await;

        let request = CrossSeedRequest {
            torrent_bytes,
            hash,
            name,
            options,
            tracker_display,
        };

        let mut results = Vec::with_capacity(instances.len());
        for instance in &instances {
            let candidate = candidates.iter().find(|c| c.instance_id == instance.id);
            match candidate {
                Some(candidate) => {
                    results.push(
                        self.executor
                            .execute(&request, instance, candidate, &ctx)
                            .await,
                    );
                }
                None => {
                    debug!(instance = %instance.name, "No local candidate");
                    results.push(InstanceCrossSeedResult {
                        instance_id: instance.id,
                        instance_name: instance.name.clone(),
                        status: CrossSeedStatus::NoMatch,
                        message: "No matching release on this instance".to_string(),
                        matched_hash: None,
                        expected_progress: None,
                    });
                }
            }
        }

        Ok(results)
    }

    async fn target_instances(&self, target_ids: &[i64]) -> Result<Vec<InstanceRecord>> {
        let enabled = self.db.instances().list_enabled().await?;
        if target_ids.is_empty() {
            return Ok(enabled);
        }

        let mut chosen = Vec::new();
        for id in target_ids {
            match enabled.iter().find(|i| i.id == *id) {
                Some(instance) => chosen.push(instance.clone()),
                None => {
                    return Err(CrossSeedError::InstanceNotFound(*id).into());
                }
            }
        }
        Ok(chosen)
    }
}
