//! Search run orchestration
//!
//! One background task owns each run. Candidates are processed one at a
//! time; the indexer fan-out inside a candidate is bounded by a semaphore.
//! Per-candidate failures are isolated so one indexer outage cannot poison
//! the run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{TorrentClient, TorrentFilter, TorrentSnapshot};
use crate::db::{
    AutomationSettings, Database, FeedItemRecord, FeedItemStatus, InstanceRecord, RunStatus,
    RunTotals, SearchRunRecord, SearchRunResult,
};
use crate::error::{CrossSeedError, RateLimitWaitError};
use crate::executor::{CrossSeedOptions, CrossSeedStatus};
use crate::gazelle::{GazelleClient, calculate_hashes_with_sources, gazelle_targets_for_source};
use crate::indexer::{IndexerInfo, IndexerProvider, SearchKind, SearchRequest};
use crate::release::{ContentKind, ParsedRelease, ReleaseCache};
use crate::service::CrossSeedService;
use crate::util::paths::normalize_hash;

use super::rate_limit::CooldownRegistry;
use super::score::evaluate_release_match;
use super::{
    SELECTED_INDEXER_CAPABILITY_SKIP_REASON, SELECTED_INDEXER_CONTENT_SKIP_REASON, SearchFilters,
};

/// Timing model for a run
#[derive(Debug, Clone)]
pub struct SearchTimingConfig {
    /// Base allowance for a candidate's searches
    pub base_timeout: Duration,
    /// Extra allowance per additional enabled indexer
    pub per_indexer_timeout: Duration,
    /// Hard cap on a candidate's search window
    pub max_timeout: Duration,
    /// In-flight indexer queries per candidate
    pub max_concurrent_queries: usize,
}

impl Default for SearchTimingConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(30),
            per_indexer_timeout: Duration::from_secs(15),
            max_timeout: Duration::from_secs(5 * 60),
            max_concurrent_queries: 3,
        }
    }
}

impl SearchTimingConfig {
    /// `base + (k-1) * per_indexer`, capped
    pub fn candidate_timeout(&self, indexer_count: usize) -> Duration {
        let extra = self
            .per_indexer_timeout
            .saturating_mul(indexer_count.saturating_sub(1) as u32);
        (self.base_timeout + extra).min(self.max_timeout)
    }
}

/// Options for starting a run
#[derive(Debug, Clone, Default)]
pub struct SearchRunOptions {
    pub instance_id: i64,
    /// Restrict to these indexers; empty means all enabled
    pub selected_indexer_ids: Vec<i64>,
    pub cooldown_minutes: Option<i64>,
    pub disable_torznab: bool,
    /// Skip the per-content-type indexer filter
    pub skip_content_filter: bool,
    pub filters: SearchFilters,
    pub find_individual_episodes: Option<bool>,
}

struct ActiveRun {
    run_id: i64,
    token: CancellationToken,
}

/// One queued candidate: the source snapshot plus its cached parse
struct QueueEntry {
    snapshot: TorrentSnapshot,
    release: Arc<ParsedRelease>,
    /// Hashes of content-identical torrents covered by this search
    duplicate_hashes: Vec<String>,
}

/// Orchestrates indexer search runs
pub struct SearchOrchestrator {
    db: Database,
    client: Arc<dyn TorrentClient>,
    indexers: Arc<dyn IndexerProvider>,
    gazelle: Option<Arc<GazelleClient>>,
    service: Arc<CrossSeedService>,
    cache: Arc<ReleaseCache>,
    cooldowns: Arc<CooldownRegistry>,
    timing: SearchTimingConfig,
    active: Mutex<Option<ActiveRun>>,
}

impl SearchOrchestrator {
    pub fn new(
        db: Database,
        client: Arc<dyn TorrentClient>,
        indexers: Arc<dyn IndexerProvider>,
        gazelle: Option<Arc<GazelleClient>>,
        service: Arc<CrossSeedService>,
        cache: Arc<ReleaseCache>,
    ) -> Self {
        let cooldowns = Arc::new(CooldownRegistry::new(db.clone()));
        Self {
            db,
            client,
            indexers,
            gazelle,
            service,
            cache,
            cooldowns,
            timing: SearchTimingConfig::default(),
            active: Mutex::new(None),
        }
    }

    pub fn with_timing(mut self, timing: SearchTimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn cooldowns(&self) -> &Arc<CooldownRegistry> {
        &self.cooldowns
    }

    /// Validate, persist a `running` row, and spawn the run's task
    pub async fn start_search_run(
        self: &Arc<Self>,
        options: SearchRunOptions,
    ) -> Result<SearchRunRecord> {
        let instance = self
            .db
            .instances()
            .get(options.instance_id)
            .await?
            .ok_or(CrossSeedError::InstanceNotFound(options.instance_id))?;

        let settings = self.db.settings().get().await?;

        let torznab_available = !options.disable_torznab
            && !settings.disable_torznab
            && !self.indexers.list_enabled().is_empty();
        let gazelle_available = settings.gazelle_enabled
            && self.gazelle.as_ref().is_some_and(|g| g.config().any_configured());

        if options.disable_torznab && !gazelle_available {
            return Err(CrossSeedError::InvalidRequest(
                "Torznab disabled but Gazelle matching is not configured".to_string(),
            )
            .into());
        }
        if !torznab_available && !gazelle_available {
            return Err(CrossSeedError::InvalidRequest(
                "no search backend available: configure Torznab indexers or Gazelle keys"
                    .to_string(),
            )
            .into());
        }

        {
            let active = self.active.lock();
            if active.is_some() {
                return Err(CrossSeedError::InvalidRequest(
                    "a search run is already active".to_string(),
                )
                .into());
            }
        }

        let cooldown_minutes = options
            .cooldown_minutes
            .unwrap_or(settings.cooldown_minutes);
        let run = self
            .db
            .search_runs()
            .create(
                instance.id,
                serde_json::to_value(&options.filters)?,
                &options.selected_indexer_ids,
                (settings.interval_hours * 3600) as i64,
                cooldown_minutes,
            )
            .await?;

        let token = CancellationToken::new();
        *self.active.lock() = Some(ActiveRun {
            run_id: run.id,
            token: token.clone(),
        });

        let orchestrator = Arc::clone(self);
        let run_for_task = run.clone();
        tokio::spawn(async move {
            orchestrator
                .run_loop(
                    run_for_task,
                    instance,
                    options,
                    settings,
                    torznab_available,
                    gazelle_available,
                    token,
                )
                .await;
        });

        Ok(run)
    }

    /// Cancel the active run, if any. The loop observes the token at its
    /// next suspension point and closes the run.
    pub fn cancel_automation_run(&self) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(run) => {
                info!(run_id = run.run_id, "Cancelling active search run");
                run.token.cancel();
                true
            }
            None => false,
        }
    }

    /// The id of the active run, if one is running
    pub fn active_run_id(&self) -> Option<i64> {
        self.active.lock().as_ref().map(|r| r.run_id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        self: Arc<Self>,
        run: SearchRunRecord,
        instance: InstanceRecord,
        options: SearchRunOptions,
        settings: AutomationSettings,
        torznab_available: bool,
        gazelle_available: bool,
        token: CancellationToken,
    ) {
        if let Err(e) = self.cooldowns.load().await {
            warn!(error = %e, "Could not load persisted cooldowns");
        }

        let mut totals = RunTotals::default();
        let mut results: Vec<SearchRunResult> = Vec::new();

        let outcome = self
            .process_run(
                &run,
                &instance,
                &options,
                &settings,
                torznab_available,
                gazelle_available,
                &token,
                &mut totals,
                &mut results,
            )
            .await;

        let status = if token.is_cancelled() {
            if totals.added > 0 || totals.matched > 0 {
                RunStatus::Partial
            } else {
                RunStatus::Cancelled
            }
        } else {
            match &outcome {
                Err(_) => RunStatus::Failed,
                Ok(()) if totals.failed == 0 => RunStatus::Success,
                Ok(()) if totals.added > 0 || totals.matched > 0 => RunStatus::Partial,
                Ok(()) => RunStatus::Failed,
            }
        };
        if let Err(e) = &outcome {
            warn!(run_id = run.id, error = %e, "Search run aborted");
        }

        if let Err(e) = self
            .db
            .search_runs()
            .close(run.id, status, &totals, &results)
            .await
        {
            warn!(run_id = run.id, error = %e, "Could not close search run");
        }

        *self.active.lock() = None;
        info!(
            run_id = run.id,
            status = %status,
            searched = totals.searched,
            skipped = totals.skipped,
            matched = totals.matched,
            added = totals.added,
            failed = totals.failed,
            "Search run finished"
        );
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_run(
        &self,
        run: &SearchRunRecord,
        instance: &InstanceRecord,
        options: &SearchRunOptions,
        settings: &AutomationSettings,
        torznab_available: bool,
        gazelle_available: bool,
        token: &CancellationToken,
        totals: &mut RunTotals,
        results: &mut Vec<SearchRunResult>,
    ) -> Result<()> {
        let queue = self
            .refresh_queue(instance, options, run.cooldown_minutes, totals)
            .await?;
        info!(
            run_id = run.id,
            candidates = queue.len(),
            skipped = totals.skipped,
            "Search queue refreshed"
        );

        let enabled = self.indexers.list_enabled();
        let candidate_timeout = self.timing.candidate_timeout(enabled.len().max(1));

        for entry in queue {
            if token.is_cancelled() {
                break;
            }

            let processed = tokio::select! {
                outcome = self.process_candidate(
                    run,
                    instance,
                    options,
                    settings,
                    torznab_available,
                    gazelle_available,
                    &enabled,
                    candidate_timeout,
                    &entry,
                    totals,
                    results,
                ) => outcome,
                () = token.cancelled() => break,
            };
            if let Err(e) = processed {
                warn!(
                    torrent = %entry.snapshot.name,
                    error = %e,
                    "Candidate processing failed"
                );
                totals.failed += 1;
                results.push(SearchRunResult {
                    torrent_hash: entry.snapshot.hash.clone(),
                    torrent_name: entry.snapshot.name.clone(),
                    indexer_id: None,
                    indexer_name: None,
                    status: "failed".to_string(),
                    message: e.to_string(),
                    match_score: None,
                    match_reasons: Vec::new(),
                });
            }

            self.propagate_duplicate_search_history(instance.id, &entry)
                .await;
            totals.searched += 1;

            if let Err(e) = self
                .db
                .search_runs()
                .update_progress(run.id, totals, results)
                .await
            {
                warn!(run_id = run.id, error = %e, "Could not persist run progress");
            }
        }

        Ok(())
    }

    /// List the instance's complete torrents, apply run filters and the
    /// cooldown table, and collapse content-identical duplicates onto one
    /// representative.
    async fn refresh_queue(
        &self,
        instance: &InstanceRecord,
        options: &SearchRunOptions,
        cooldown_minutes: i64,
        totals: &mut RunTotals,
    ) -> Result<Vec<QueueEntry>> {
        let torrents = self
            .client
            .get_torrents(instance.id, TorrentFilter::Completed)
            .await
            .context("Listing completed torrents for search run")?;

        let history = self.db.search_history();
        let mut eligible: Vec<TorrentSnapshot> = Vec::new();
        for torrent in torrents {
            if !torrent.is_complete() {
                continue;
            }
            if !options.filters.accepts(&torrent.category, &torrent.tags) {
                continue;
            }
            if history
                .is_within_cooldown(instance.id, &torrent.hash, cooldown_minutes)
                .await?
            {
                totals.skipped += 1;
                continue;
            }
            eligible.push(torrent);
        }

        // Content-identical torrents share one search
        let mut entries: Vec<QueueEntry> = Vec::new();
        for torrent in eligible {
            let release = self.cache.parse(&torrent.name);
            let key = release.release_key();
            let representative = (!key.is_empty())
                .then(|| {
                    entries.iter().position(|e| {
                        e.release.release_key() == key && e.snapshot.size == torrent.size
                    })
                })
                .flatten();
            match representative {
                Some(idx) => {
                    debug!(
                        duplicate = %torrent.hash,
                        representative = %entries[idx].snapshot.hash,
                        "Search covers duplicate torrent"
                    );
                    entries[idx].duplicate_hashes.push(torrent.hash.clone());
                }
                None => entries.push(QueueEntry {
                    snapshot: torrent,
                    release,
                    duplicate_hashes: Vec::new(),
                }),
            }
        }

        Ok(entries)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_candidate(
        &self,
        run: &SearchRunRecord,
        instance: &InstanceRecord,
        options: &SearchRunOptions,
        settings: &AutomationSettings,
        torznab_available: bool,
        gazelle_available: bool,
        enabled: &[IndexerInfo],
        candidate_timeout: Duration,
        entry: &QueueEntry,
        totals: &mut RunTotals,
        results: &mut Vec<SearchRunResult>,
    ) -> Result<()> {
        let kind = search_kind_for(&entry.release);
        debug!(
            torrent = %entry.snapshot.name,
            kind = %kind,
            "Processing search candidate"
        );

        // Gazelle cross-site matching runs for music regardless of Torznab
        if gazelle_available && kind == SearchKind::Music {
            self.process_gazelle(instance, settings, entry, totals, results)
                .await;
        }

        let find_individual_episodes = options
            .find_individual_episodes
            .unwrap_or(settings.find_individual_episodes);

        if !torznab_available {
            return Ok(());
        }

        // Capability filter, then content filter, then the caller's selection
        let capable: Vec<i64> = enabled
            .iter()
            .filter(|info| {
                self.indexers
                    .capabilities(info.id)
                    .map(|caps| caps.supports(kind))
                    .unwrap_or(false)
            })
            .map(|info| info.id)
            .collect();

        let content_eligible: Vec<i64> = if options.skip_content_filter {
            capable.clone()
        } else {
            capable
                .iter()
                .copied()
                .filter(|id| {
                    self.indexers
                        .capabilities(*id)
                        .map(|caps| carries_content(&caps.categories, kind))
                        .unwrap_or(false)
                })
                .collect()
        };

        let allowed = resolve_allowed_indexer_ids(
            &options.selected_indexer_ids,
            &capable,
            &content_eligible,
        );
        let allowed = match allowed {
            Ok(ids) => ids,
            Err(reason) => {
                totals.skipped += 1;
                results.push(SearchRunResult {
                    torrent_hash: entry.snapshot.hash.clone(),
                    torrent_name: entry.snapshot.name.clone(),
                    indexer_id: None,
                    indexer_name: None,
                    status: "skipped".to_string(),
                    message: reason.to_string(),
                    match_score: None,
                    match_reasons: Vec::new(),
                });
                return Ok(());
            }
        };
        if allowed.is_empty() {
            return Ok(());
        }

        // Bounded fan-out across the allowed indexers
        let semaphore = Arc::new(Semaphore::new(self.timing.max_concurrent_queries.max(1)));
        let mut handles = Vec::new();
        for indexer_id in allowed {
            if let Some(remaining) = self.cooldowns.remaining(indexer_id) {
                debug!(indexer_id, remaining = ?remaining, "Indexer cooling down; skipped");
                continue;
            }

            let request = SearchRequest {
                query: entry.release.title.clone(),
                kind,
                season: entry.release.series,
                episode: entry.release.episode,
                year: entry.release.year,
                limit: Some(settings.max_results_per_indexer as u32),
                indexer_ids: vec![indexer_id],
            };

            let permit = semaphore.clone().acquire_owned().await?;
            let indexers = self.indexers.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome =
                    tokio::time::timeout(candidate_timeout, indexers.search(&request)).await;
                (indexer_id, outcome)
            }));
        }

        let mut search_results = Vec::new();
        for handle in handles {
            let (indexer_id, outcome) = handle.await?;
            match outcome {
                Ok(Ok(mut rows)) => search_results.append(&mut rows),
                Ok(Err(e)) => {
                    if let Some(rate_limit) = RateLimitWaitError::find_in(&e) {
                        self.cooldowns.apply_error(rate_limit).await;
                        warn!(
                            indexer = %rate_limit.indexer_name,
                            wait = ?rate_limit.effective_wait(),
                            "Indexer rate-limited; cooldown recorded"
                        );
                    } else {
                        warn!(indexer_id, error = %e, "Indexer search failed");
                    }
                }
                Err(_) => warn!(indexer_id, "Indexer search timed out"),
            }
        }

        // Evaluate, download, and hand accepted results to the executor
        for result in search_results {
            if token_hash_is_local(&entry.snapshot, &result.info_hash) {
                continue;
            }

            if let Ok(Some(item)) = self
                .db
                .feed_items()
                .get(&result.guid, result.indexer_id)
                .await
            {
                if item.last_status == FeedItemStatus::Processed {
                    debug!(guid = %result.guid, "Feed item already processed; skipped");
                    continue;
                }
            }

            let candidate_rel = self.cache.parse(&result.title);
            let verdict = evaluate_release_match(&entry.release, &candidate_rel);
            if !verdict.matched {
                continue;
            }

            let disposition = self
                .apply_indexer_result(
                    run,
                    instance,
                    settings,
                    find_individual_episodes,
                    &result,
                    verdict.score,
                )
                .await;

            let (status, message, feed_status) = match disposition {
                Ok(message) => {
                    totals.added += 1;
                    ("added".to_string(), message, FeedItemStatus::Processed)
                }
                Err(e) => {
                    totals.failed += 1;
                    ("failed".to_string(), e.to_string(), FeedItemStatus::Failed)
                }
            };
            totals.matched += 1;

            results.push(SearchRunResult {
                torrent_hash: entry.snapshot.hash.clone(),
                torrent_name: entry.snapshot.name.clone(),
                indexer_id: Some(result.indexer_id),
                indexer_name: Some(result.indexer_name.clone()),
                status,
                message,
                match_score: Some(verdict.score),
                match_reasons: verdict.reasons.clone(),
            });

            let feed_item = FeedItemRecord {
                guid: result.guid.clone(),
                indexer_id: result.indexer_id,
                title: result.title.clone(),
                last_status: feed_status,
                last_run_id: Some(run.id),
                info_hash: result.info_hash.clone(),
                updated_at: Utc::now(),
            };
            if let Err(e) = self.db.feed_items().upsert(&feed_item).await {
                warn!(guid = %feed_item.guid, error = %e, "Could not cache feed item");
            }
        }

        Ok(())
    }

    /// Download one accepted result and run the cross-seed attempt
    #[allow(clippy::too_many_arguments)]
    async fn apply_indexer_result(
        &self,
        _run: &SearchRunRecord,
        instance: &InstanceRecord,
        settings: &AutomationSettings,
        find_individual_episodes: bool,
        result: &crate::indexer::SearchResult,
        score: u32,
    ) -> Result<String> {
        let bytes = super::rate_limit::retry_transient(
            || self.indexers.download_torrent(result.indexer_id, &result.download_url),
            "indexer torrent download",
        )
        .await?;

        let mut options = CrossSeedOptions::from_settings(settings);
        options.using_indexer_category = true;
        options.find_individual_episodes = find_individual_episodes;

        let outcomes = self
            .service
            .cross_seed(
                bytes,
                Some(result.title.clone()),
                None,
                &[instance.id],
                options,
            )
            .await?;

        let outcome = outcomes
            .into_iter()
            .next()
            .context("Cross-seed produced no result")?;
        match outcome.status {
            CrossSeedStatus::Added
            | CrossSeedStatus::AddedHardlink
            | CrossSeedStatus::AddedReflink
            | CrossSeedStatus::Exists => Ok(format!(
                "{} (score {}): {}",
                outcome.status, score, outcome.message
            )),
            other => Err(anyhow::anyhow!(
                "{} (score {}): {}",
                other,
                score,
                outcome.message
            )),
        }
    }

    /// RED↔OPS matching: predict the sibling site's info-hash and skip the
    /// probe entirely when the target client already holds it.
    async fn process_gazelle(
        &self,
        instance: &InstanceRecord,
        settings: &AutomationSettings,
        entry: &QueueEntry,
        totals: &mut RunTotals,
        results: &mut Vec<SearchRunResult>,
    ) {
        let Some(gazelle) = &self.gazelle else {
            return;
        };

        let domain = self.cache.domain_name(&entry.snapshot.tracker);
        let targets = gazelle_targets_for_source(&domain);
        if targets.is_empty() {
            return;
        }

        let exported = match self
            .client
            .export_torrent(instance.id, &entry.snapshot.hash)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(hash = %entry.snapshot.hash, error = %e, "Torrent export failed");
                return;
            }
        };

        let expected = match calculate_hashes_with_sources(&exported, &targets) {
            Ok(hashes) => hashes,
            Err(e) => {
                warn!(hash = %entry.snapshot.hash, error = %e, "Source rewrite failed");
                return;
            }
        };

        for target in targets {
            let Some(expected_hash) = expected.get(target) else {
                continue;
            };

            match self
                .client
                .has_torrent_by_any_hash(instance.id, &[expected_hash.clone()])
                .await
            {
                Ok(Some(existing)) => {
                    debug!(
                        target,
                        hash = %expected_hash,
                        existing = %existing.name,
                        "Sibling-site torrent already present; probe skipped"
                    );
                    results.push(SearchRunResult {
                        torrent_hash: entry.snapshot.hash.clone(),
                        torrent_name: entry.snapshot.name.clone(),
                        indexer_id: None,
                        indexer_name: Some(target.to_string()),
                        status: "skipped".to_string(),
                        message: format!("{} flavor already on the client", target),
                        match_score: None,
                        match_reasons: Vec::new(),
                    });
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Local hash check failed; probing anyway");
                }
            }

            match gazelle.find_torrent_by_hash(target, expected_hash).await {
                Ok(Some(found)) => {
                    debug!(target, id = found.id, "Gazelle sibling found");
                    match gazelle.download_torrent(target, found.id).await {
                        Ok(bytes) => {
                            let mut options = CrossSeedOptions::from_settings(settings);
                            options.using_indexer_category = true;
                            let outcome = self
                                .service
                                .cross_seed(bytes, None, Some(target.to_string()), &[instance.id], options)
                                .await;
                            let (status, message) = match outcome {
                                Ok(rows) => {
                                    let row = rows.into_iter().next();
                                    match row {
                                        Some(row)
                                            if matches!(
                                                row.status,
                                                CrossSeedStatus::Added
                                                    | CrossSeedStatus::AddedHardlink
                                                    | CrossSeedStatus::AddedReflink
                                                    | CrossSeedStatus::Exists
                                            ) =>
                                        {
                                            totals.added += 1;
                                            totals.matched += 1;
                                            ("added".to_string(), row.message)
                                        }
                                        Some(row) => {
                                            totals.failed += 1;
                                            ("failed".to_string(), row.message)
                                        }
                                        None => {
                                            totals.failed += 1;
                                            ("failed".to_string(), "no result".to_string())
                                        }
                                    }
                                }
                                Err(e) => {
                                    totals.failed += 1;
                                    ("failed".to_string(), e.to_string())
                                }
                            };
                            results.push(SearchRunResult {
                                torrent_hash: entry.snapshot.hash.clone(),
                                torrent_name: entry.snapshot.name.clone(),
                                indexer_id: None,
                                indexer_name: Some(target.to_string()),
                                status,
                                message,
                                match_score: None,
                                match_reasons: vec![format!("{} source rewrite", target)],
                            });
                        }
                        Err(e) => {
                            warn!(target, error = %e, "Gazelle download failed");
                            totals.failed += 1;
                        }
                    }
                }
                Ok(None) => {
                    debug!(target, hash = %expected_hash, "No sibling on {}", target);
                }
                Err(e) => {
                    warn!(target, error = %e, "Gazelle probe failed");
                }
            }
        }
    }

    /// Mark the representative and its duplicates searched so the cooldown
    /// table covers them all
    async fn propagate_duplicate_search_history(&self, instance_id: i64, entry: &QueueEntry) {
        let now = Utc::now();
        let history = self.db.search_history();
        let mut hashes = vec![entry.snapshot.hash.clone()];
        hashes.extend(entry.duplicate_hashes.iter().cloned());
        for hash in hashes {
            if let Err(e) = history.record_search(instance_id, &hash, now).await {
                warn!(hash = %hash, error = %e, "Could not record search history");
            }
        }
    }
}

/// Map parsed content to a Torznab search kind
fn search_kind_for(release: &ParsedRelease) -> SearchKind {
    if release.is_tv() || (release.month.is_some() && release.day.is_some()) {
        return SearchKind::Tv;
    }
    match release.kind {
        ContentKind::Episode | ContentKind::Series => SearchKind::Tv,
        ContentKind::Movie => SearchKind::Movie,
        ContentKind::Music | ContentKind::Audiobook => SearchKind::Music,
        ContentKind::Book | ContentKind::Comic => SearchKind::Book,
        _ => SearchKind::Generic,
    }
}

/// Whether an indexer's category list carries the content kind
fn carries_content(categories: &[i32], kind: SearchKind) -> bool {
    if categories.is_empty() {
        return true;
    }
    let family = |category: i32| category / 1000;
    let wanted: &[i32] = match kind {
        SearchKind::Tv => &[5],
        SearchKind::Movie => &[2],
        SearchKind::Music => &[3],
        SearchKind::Book => &[7, 8],
        SearchKind::Generic => return true,
    };
    categories
        .iter()
        .any(|category| wanted.contains(&family(*category)))
}

/// Apply the caller's indexer selection on top of the eligibility filters.
///
/// An empty selection means "all eligible". A selection that empties the
/// set is reported with the filter that removed the last indexer.
fn resolve_allowed_indexer_ids(
    selected: &[i64],
    capable: &[i64],
    content_eligible: &[i64],
) -> Result<Vec<i64>, &'static str> {
    if selected.is_empty() {
        return Ok(content_eligible.to_vec());
    }

    let after_capability: Vec<i64> = selected
        .iter()
        .copied()
        .filter(|id| capable.contains(id))
        .collect();
    if after_capability.is_empty() {
        return Err(SELECTED_INDEXER_CAPABILITY_SKIP_REASON);
    }

    let after_content: Vec<i64> = after_capability
        .iter()
        .copied()
        .filter(|id| content_eligible.contains(id))
        .collect();
    if after_content.is_empty() {
        return Err(SELECTED_INDEXER_CONTENT_SKIP_REASON);
    }

    Ok(after_content)
}

/// An indexer result pointing at a hash the source torrent already has
fn token_hash_is_local(snapshot: &TorrentSnapshot, info_hash: &Option<String>) -> bool {
    let Some(info_hash) = info_hash else {
        return false;
    };
    let info_hash = normalize_hash(info_hash);
    snapshot
        .all_hashes()
        .iter()
        .any(|h| normalize_hash(h) == info_hash)
}
