//! Cross-seed executor
//!
//! Drives a single attempt against one client instance: validate, decide
//! how to reuse the existing bytes, call AddTorrent, then wait for the
//! torrent to surface and finish the alignment/recheck dance. Every
//! attempt ends in exactly one status from the closed set; there are no
//! partial silent successes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::{
    AddTorrentOptions, BulkAction, ContentLayout, FileEntry, TorrentClient, TorrentFilter,
    TorrentProperties, TorrentSnapshot,
};
use crate::db::InstanceRecord;
use crate::error::CrossSeedError;
use crate::layout::{
    AlignmentConfig, build_file_rename_plan, calculate_expected_progress, detect_common_root,
    rename::align_added_torrent, should_align_files_with_candidate, should_rename_torrent_display,
};
use crate::linker::{
    ExistingFile, LinkDirPreset, LinkMode, LinkPlanRequest, build_link_destination,
    build_link_plan, execute_link_plan, supports_reflink,
};
use crate::matching::{MatchType, files::should_ignore_file};
use crate::release::{ParsedRelease, ReleaseCache};
use crate::resolver::{BestMatch, Candidate, CandidateResolver, ResolveContext};
use crate::torrents::parse_torrent;
use crate::util::paths::normalize_hash;

/// Final status of one cross-seed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossSeedStatus {
    Added,
    AddedHardlink,
    AddedReflink,
    Exists,
    NoMatch,
    Rejected,
    RequiresHardlinkReflink,
    HardlinkError,
    ReflinkError,
    Error,
}

impl std::fmt::Display for CrossSeedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CrossSeedStatus::Added => "added",
            CrossSeedStatus::AddedHardlink => "added_hardlink",
            CrossSeedStatus::AddedReflink => "added_reflink",
            CrossSeedStatus::Exists => "exists",
            CrossSeedStatus::NoMatch => "no_match",
            CrossSeedStatus::Rejected => "rejected",
            CrossSeedStatus::RequiresHardlinkReflink => "requires_hardlink_reflink",
            CrossSeedStatus::HardlinkError => "hardlink_error",
            CrossSeedStatus::ReflinkError => "reflink_error",
            CrossSeedStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Caller options for one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossSeedOptions {
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub skip_if_exists: bool,
    pub start_paused: bool,
    pub add_cross_seed_tag: bool,
    pub size_tolerance_percent: f64,
    pub find_individual_episodes: bool,
    /// The category came from an indexer, not the user; AutoTMM must not
    /// adopt it
    pub using_indexer_category: bool,
}

impl Default for CrossSeedOptions {
    fn default() -> Self {
        Self {
            category: None,
            tags: Vec::new(),
            ignore_patterns: Vec::new(),
            skip_if_exists: true,
            start_paused: false,
            add_cross_seed_tag: true,
            size_tolerance_percent: 2.0,
            find_individual_episodes: false,
            using_indexer_category: false,
        }
    }
}

/// One attempt's inputs
#[derive(Debug, Clone)]
pub struct CrossSeedRequest {
    pub torrent_bytes: Vec<u8>,
    pub hash: String,
    pub name: String,
    pub options: CrossSeedOptions,
    /// Friendly tracker name for by-tracker link directories
    pub tracker_display: Option<String>,
}

/// Outcome reported for one (instance, torrent) attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceCrossSeedResult {
    pub instance_id: i64,
    pub instance_name: String,
    pub status: CrossSeedStatus,
    pub message: String,
    pub matched_hash: Option<String>,
    pub expected_progress: Option<f64>,
}

impl InstanceCrossSeedResult {
    fn new(instance: &InstanceRecord, status: CrossSeedStatus, message: impl Into<String>) -> Self {
        Self {
            instance_id: instance.id,
            instance_name: instance.name.clone(),
            status,
            message: message.into(),
            matched_hash: None,
            expected_progress: None,
        }
    }
}

/// Timing knobs; tests shrink these to milliseconds
#[derive(Debug, Clone)]
pub struct ExecutorTiming {
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
    pub recheck_timeout: Duration,
    pub recheck_poll_interval: Duration,
}

impl Default for ExecutorTiming {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            recheck_timeout: Duration::from_secs(5 * 60),
            recheck_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Progress treated as complete after a recheck
const RESUME_PROGRESS_THRESHOLD: f64 = 0.999;

/// Tag appended to cross-seeded torrents when enabled
const CROSS_SEED_TAG: &str = "cross-seed";

/// Executes cross-seed attempts against client instances
pub struct CrossSeedExecutor {
    client: Arc<dyn TorrentClient>,
    cache: Arc<ReleaseCache>,
    resolver: CandidateResolver,
    timing: ExecutorTiming,
}

impl CrossSeedExecutor {
    pub fn new(client: Arc<dyn TorrentClient>, cache: Arc<ReleaseCache>) -> Self {
        Self {
            resolver: CandidateResolver::new(client.clone(), cache.clone()),
            client,
            cache,
            timing: ExecutorTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: ExecutorTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Run one attempt. Never returns an error; every failure mode maps to
    /// a status.
    pub async fn execute(
        &self,
        request: &CrossSeedRequest,
        instance: &InstanceRecord,
        candidate: &Candidate,
        ctx: &ResolveContext,
    ) -> InstanceCrossSeedResult {
        match self.try_execute(request, instance, candidate, ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(instance = %instance.name, error = %e, "Cross-seed attempt failed");
                InstanceCrossSeedResult::new(instance, CrossSeedStatus::Error, e.to_string())
            }
        }
    }

    async fn try_execute(
        &self,
        request: &CrossSeedRequest,
        instance: &InstanceRecord,
        candidate: &Candidate,
        ctx: &ResolveContext,
    ) -> Result<InstanceCrossSeedResult> {
        let options = &request.options;

        // Existence check across every hash form the torrent is known by
        let meta = parse_torrent(&request.torrent_bytes)?;
        let mut known_hashes = vec![normalize_hash(&request.hash)];
        for hash in meta.all_hashes() {
            let hash = normalize_hash(&hash);
            if !known_hashes.contains(&hash) {
                known_hashes.push(hash);
            }
        }
        if options.skip_if_exists {
            if let Some(existing) = self
                .client
                .has_torrent_by_any_hash(instance.id, &known_hashes)
                .await?
            {
                let mut result = InstanceCrossSeedResult::new(
                    instance,
                    CrossSeedStatus::Exists,
                    format!("Torrent already present as '{}'", existing.name),
                );
                result.matched_hash = Some(existing.hash);
                return Ok(result);
            }
        }

        let new_rel = self.cache.parse(&request.name);
        let new_files = &meta.files;

        // Best file-verified match among the instance's candidates
        let Some(best) = self
            .resolver
            .find_best_candidate_match(
                candidate,
                &new_rel,
                new_files,
                &options.ignore_patterns,
                ctx,
            )
            .await?
        else {
            return Ok(InstanceCrossSeedResult::new(
                instance,
                CrossSeedStatus::NoMatch,
                "No completed torrent with compatible files",
            ));
        };

        if best.match_type == MatchType::PartialContains {
            return Ok(InstanceCrossSeedResult::new(
                instance,
                CrossSeedStatus::NoMatch,
                "Local match covers only part of the new torrent; adding it would download the rest",
            ));
        }

        let props = self
            .client
            .get_torrent_properties(instance.id, &best.torrent.hash)
            .await
            .unwrap_or_else(|e| {
                debug!(error = %e, "Falling back to snapshot save path");
                TorrentProperties {
                    save_path: best.torrent.save_path.clone(),
                    content_path: best.torrent.content_path.clone(),
                    auto_managed: best.torrent.auto_managed,
                }
            });

        let expected_progress = calculate_expected_progress(new_files, &best.files);
        let matched_rel = self.cache.parse(&best.torrent.name);

        // Reuse-safety gate: decide whether the client may attach directly
        // at the matched save path. An episode matched inside a season pack
        // is exempt from the extras check: the rest of the pack is expected
        // to be there.
        let pack_covers_episode =
            new_rel.is_single_episode() && matched_rel.is_season_pack();
        let extras = !pack_covers_episode
            && has_extra_source_files(&best.files, new_files, &options.ignore_patterns);
        let uncovered_percent = (1.0 - expected_progress) * 100.0;
        let sizes_ok = uncovered_percent <= options.size_tolerance_percent;
        let rootless_loose_match = detect_common_root(new_files).is_none()
            && matches!(best.match_type, MatchType::Size | MatchType::PartialContains);
        let direct_unsafe = extras || !sizes_ok || rootless_loose_match;

        if direct_unsafe {
            return self
                .execute_linked(
                    request,
                    instance,
                    &best,
                    new_files,
                    expected_progress,
                    extras,
                    sizes_ok,
                )
                .await;
        }

        self.execute_direct(
            request,
            instance,
            &best,
            new_files,
            &props,
            &new_rel,
            expected_progress,
        )
        .await
    }

    /// Direct mode: attach at the matched torrent's save path
    #[allow(clippy::too_many_arguments)]
    async fn execute_direct(
        &self,
        request: &CrossSeedRequest,
        instance: &InstanceRecord,
        best: &BestMatch,
        new_files: &[FileEntry],
        props: &TorrentProperties,
        new_rel: &ParsedRelease,
        expected_progress: f64,
    ) -> Result<InstanceCrossSeedResult> {
        let options = &request.options;
        let matched_rel = self.cache.parse(&best.torrent.name);

        let save_path = determine_save_path(new_rel, &matched_rel, &best.torrent, props);

        let category = options
            .category
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| best.torrent.category.clone());
        let tags = merge_tags(&best.torrent.tags, &options.tags, options.add_cross_seed_tag);

        let category_save_path = match self.client.get_categories(instance.id).await {
            Ok(categories) => categories.get(&category).map(|c| c.save_path.clone()),
            Err(_) => None,
        };
        let (auto_tmm, category_paths_match) = should_enable_auto_tmm(
            &category,
            props.auto_managed,
            options.using_indexer_category,
            category_save_path.as_deref(),
            &save_path,
        );

        let add_options = AddTorrentOptions {
            paused: options.start_paused,
            stopped: options.start_paused,
            skip_checking: true,
            auto_tmm,
            save_path: (!auto_tmm).then(|| save_path.clone()),
            category: (!category.is_empty()).then(|| category.clone()),
            tags: tags.clone(),
            content_layout: None,
            use_download_path: None,
        };
        self.add_with_retry(instance.id, &request.torrent_bytes, &add_options)
            .await?;

        self.wait_for_torrent(instance.id, &request.hash).await?;

        // Align the new torrent's paths onto the matched layout
        if should_align_files_with_candidate(new_rel, &matched_rel) {
            let plan = build_file_rename_plan(new_files, &best.files);
            let desired_display = should_rename_torrent_display(new_rel, &matched_rel)
                .then(|| best.torrent.name.clone());
            let alignment = AlignmentConfig {
                visibility_timeout: self.timing.visibility_timeout,
                poll_interval: self.timing.poll_interval,
            };
            if let Err(e) = align_added_torrent(
                self.client.as_ref(),
                instance.id,
                &request.hash,
                desired_display.as_deref(),
                &plan,
                &alignment,
            )
            .await
            {
                warn!(error = %e, "Post-add alignment failed; torrent left as added");
            }
        }

        info!(
            instance = %instance.name,
            match_type = %best.match_type,
            save_path = %save_path,
            auto_tmm,
            category = %category,
            "Cross-seed added in direct mode"
        );

        let mut result = InstanceCrossSeedResult::new(
            instance,
            CrossSeedStatus::Added,
            format!(
                "Added ({} match) at '{}'; autoTMM={}, category='{}'{}",
                best.match_type,
                save_path,
                auto_tmm,
                category,
                if category_paths_match { "" } else { " (category path differs)" },
            ),
        );
        result.matched_hash = Some(best.torrent.hash.clone());
        result.expected_progress = Some(expected_progress);
        Ok(result)
    }

    /// Link mode: materialize hardlinks/reflinks and attach there
    #[allow(clippy::too_many_arguments)]
    async fn execute_linked(
        &self,
        request: &CrossSeedRequest,
        instance: &InstanceRecord,
        best: &BestMatch,
        new_files: &[FileEntry],
        expected_progress: f64,
        extras: bool,
        sizes_ok: bool,
    ) -> Result<InstanceCrossSeedResult> {
        let options = &request.options;

        if !instance.link_mode_enabled() {
            let reason = if extras {
                "matched torrent has extra files"
            } else if !sizes_ok {
                "sizes differ beyond tolerance"
            } else {
                "rootless torrent with a loose match"
            };
            return Ok(InstanceCrossSeedResult::new(
                instance,
                CrossSeedStatus::RequiresHardlinkReflink,
                format!("Direct reuse unsafe ({}); enable hardlinks or reflinks", reason),
            ));
        }

        let mut mode = if instance.use_reflinks {
            LinkMode::Reflink
        } else {
            LinkMode::Hardlink
        };
        let error_status = |mode: LinkMode| match mode {
            LinkMode::Reflink => CrossSeedStatus::ReflinkError,
            _ => CrossSeedStatus::HardlinkError,
        };

        if !instance.has_local_filesystem_access {
            return Ok(InstanceCrossSeedResult::new(
                instance,
                error_status(mode),
                "Instance has no local filesystem access; links cannot be created",
            ));
        }

        let has_root = detect_common_root(new_files).is_some();

        let dest = match build_link_destination(
            &instance.hardlink_base_dir,
            LinkDirPreset::parse(&instance.hardlink_dir_preset),
            &request.name,
            &request.hash,
            request.tracker_display.as_deref(),
            Some(&instance.name),
            has_root,
        ) {
            Ok(dest) => dest,
            Err(e) => {
                return Ok(InstanceCrossSeedResult::new(
                    instance,
                    error_status(mode),
                    format!("Link destination unavailable: {}", root_message(&e)),
                ));
            }
        };

        let existing = existing_files_for(&best.torrent, &best.files);
        let plan_request = LinkPlanRequest {
            torrent_files: new_files,
            existing: &existing,
            layout: ContentLayout::Original,
            display_name: &request.name,
            dest_dir: &dest,
            ignore_patterns: &options.ignore_patterns,
            max_download_fraction: Some(options.size_tolerance_percent / 100.0),
        };
        let plan = match build_link_plan(&plan_request) {
            Ok(plan) => plan,
            Err(e) => {
                return Ok(InstanceCrossSeedResult::new(
                    instance,
                    error_status(mode),
                    format!("Link planning failed: {}", root_message(&e)),
                ));
            }
        };

        if mode == LinkMode::Reflink {
            let probe_dir = Path::new(&instance.hardlink_base_dir);
            if !probe_dir.exists() || !supports_reflink(probe_dir) {
                if instance.fallback_to_regular_mode {
                    debug!(
                        instance = %instance.name,
                        "Reflinks unsupported; falling back to regular mode"
                    );
                    mode = LinkMode::Direct;
                } else {
                    return Ok(InstanceCrossSeedResult::new(
                        instance,
                        CrossSeedStatus::ReflinkError,
                        "Filesystem does not support reflinks",
                    ));
                }
            }
        }

        let (save_path, skip_checking, status) = match mode {
            LinkMode::Direct => {
                // Regular-mode fallback: attach at the matched save path and
                // let the recheck sort out what is actually there
                (best.torrent.save_path.clone(), false, CrossSeedStatus::Added)
            }
            linked => {
                if let Err(e) = execute_link_plan(&plan, linked) {
                    return Ok(InstanceCrossSeedResult::new(
                        instance,
                        error_status(linked),
                        format!("Link creation failed: {}", root_message(&e)),
                    ));
                }
                let status = match linked {
                    LinkMode::Hardlink => CrossSeedStatus::AddedHardlink,
                    _ => CrossSeedStatus::AddedReflink,
                };
                (plan.root_dir.display().to_string(), true, status)
            }
        };

        let tags = merge_tags(&best.torrent.tags, &options.tags, options.add_cross_seed_tag);
        let category = options
            .category
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| best.torrent.category.clone());

        let add_options = AddTorrentOptions {
            paused: options.start_paused,
            stopped: options.start_paused,
            skip_checking,
            auto_tmm: false,
            save_path: Some(save_path.clone()),
            category: (!category.is_empty()).then(|| category.clone()),
            tags,
            content_layout: Some(ContentLayout::Original),
            use_download_path: None,
        };
        self.add_with_retry(instance.id, &request.torrent_bytes, &add_options)
            .await?;

        self.wait_for_torrent(instance.id, &request.hash).await?;

        // Links carry no piece state; a recheck proves the bytes, then the
        // torrent can seed
        self.client
            .bulk_action(instance.id, &[request.hash.clone()], BulkAction::Recheck)
            .await
            .unwrap_or_else(|e| warn!(error = %e, "Recheck request failed"));
        if !options.start_paused {
            if let Err(e) = self.resume_when_checked(instance.id, &request.hash).await {
                warn!(error = %e, "Recheck polling gave up; torrent left paused");
            }
        }

        info!(
            instance = %instance.name,
            mode = %mode,
            save_path = %save_path,
            "Cross-seed added via link mode"
        );

        let mut result = InstanceCrossSeedResult::new(
            instance,
            status,
            format!("Added via {} at '{}'", mode, save_path),
        );
        result.matched_hash = Some(best.torrent.hash.clone());
        result.expected_progress = Some(expected_progress);
        Ok(result)
    }

    /// AddTorrent with the one permitted retry: drop `skip_checking` so the
    /// client rechecks instead
    async fn add_with_retry(
        &self,
        instance_id: i64,
        torrent: &[u8],
        options: &AddTorrentOptions,
    ) -> Result<()> {
        match self.client.add_torrent(instance_id, torrent, options).await {
            Ok(()) => Ok(()),
            Err(first) if options.skip_checking => {
                warn!(error = %first, "AddTorrent failed; retrying without skip_checking");
                let retry_options = AddTorrentOptions {
                    skip_checking: false,
                    ..options.clone()
                };
                self.client
                    .add_torrent(instance_id, torrent, &retry_options)
                    .await
                    .map_err(|second| {
                        CrossSeedError::TransientIo(format!(
                            "AddTorrent failed twice: {}; retry: {}",
                            first, second
                        ))
                        .into()
                    })
            }
            Err(first) => Err(CrossSeedError::TransientIo(format!(
                "AddTorrent failed: {}",
                first
            ))
            .into()),
        }
    }

    async fn wait_for_torrent(&self, instance_id: i64, hash: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.timing.visibility_timeout;
        loop {
            let found = self
                .client
                .get_torrents(instance_id, TorrentFilter::Hashes(vec![hash.to_string()]))
                .await?;
            if !found.is_empty() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CrossSeedError::TransientIo(format!(
                    "Torrent {} did not appear after add",
                    hash
                ))
                .into());
            }
            tokio::time::sleep(self.timing.poll_interval).await;
        }
    }

    /// Poll the recheck and resume once the torrent proves complete
    async fn resume_when_checked(&self, instance_id: i64, hash: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.timing.recheck_timeout;
        loop {
            let found = self
                .client
                .get_torrents(instance_id, TorrentFilter::Hashes(vec![hash.to_string()]))
                .await?;
            if let Some(snapshot) = found.first() {
                if snapshot.progress >= RESUME_PROGRESS_THRESHOLD {
                    self.client
                        .bulk_action(instance_id, &[hash.to_string()], BulkAction::Resume)
                        .await?;
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CrossSeedError::TransientIo(format!(
                    "Recheck for {} did not complete in time",
                    hash
                ))
                .into());
            }
            tokio::time::sleep(self.timing.recheck_poll_interval).await;
        }
    }
}

/// Whether the matched torrent carries non-ignored files the new torrent
/// has no counterpart for. Counterparts are claimed by size, one new file
/// per matched file, so a second same-size extra still counts as extra.
pub fn has_extra_source_files(
    matched_files: &[FileEntry],
    new_files: &[FileEntry],
    ignore_patterns: &[String],
) -> bool {
    let mut available: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();
    for file in new_files {
        *available.entry(file.size).or_insert(0) += 1;
    }

    matched_files.iter().any(|f| {
        if should_ignore_file(&f.path, ignore_patterns) {
            return false;
        }
        match available.get_mut(&f.size) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        }
    })
}

/// Resolve the save path for a direct-mode add. All pairings land on the
/// matched torrent's save path; they differ only in what gets logged.
pub fn determine_save_path(
    new_rel: &ParsedRelease,
    matched_rel: &ParsedRelease,
    matched: &TorrentSnapshot,
    props: &TorrentProperties,
) -> String {
    let save_path = if props.save_path.is_empty() {
        matched.save_path.clone()
    } else {
        props.save_path.clone()
    };

    match (
        new_rel.is_season_pack(),
        new_rel.is_single_episode(),
        matched_rel.is_season_pack(),
        matched_rel.is_single_episode(),
    ) {
        (true, _, _, true) => {
            debug!(save_path = %save_path, "Season pack reusing an episode's save path")
        }
        (_, true, true, _) => {
            debug!(save_path = %save_path, "Episode reusing a season pack's save path")
        }
        (_, true, _, true) | (true, _, true, _) => {
            debug!(save_path = %save_path, "Same-structure TV reuse")
        }
        _ => debug!(save_path = %save_path, "Movie or generic reuse"),
    }

    save_path
}

/// AutoTMM decision.
///
/// Returns (enable, category-paths-match). The paths-match flag is
/// informational only; AutoTMM is enabled regardless when the gates pass.
pub fn should_enable_auto_tmm(
    cross_category: &str,
    matched_auto_managed: bool,
    using_indexer_category: bool,
    actual_category_save_path: Option<&str>,
    matched_save_path: &str,
) -> (bool, bool) {
    let enable = !cross_category.is_empty() && matched_auto_managed && !using_indexer_category;
    let paths_match = actual_category_save_path == Some(matched_save_path);
    (enable, paths_match)
}

/// Merge matched-torrent tags with caller tags: trimmed, deduplicated,
/// insertion order preserved; the cross-seed marker goes last.
pub fn merge_tags(matched_tags: &[String], extra_tags: &[String], add_cross_seed_tag: bool) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for tag in matched_tags.iter().chain(extra_tags.iter()) {
        let tag = tag.trim();
        if !tag.is_empty() && !merged.iter().any(|t| t == tag) {
            merged.push(tag.to_string());
        }
    }
    if add_cross_seed_tag && !merged.iter().any(|t| t == CROSS_SEED_TAG) {
        merged.push(CROSS_SEED_TAG.to_string());
    }
    merged
}

fn root_message(err: &anyhow::Error) -> String {
    err.root_cause().to_string()
}

/// Absolute on-disk locations of a matched torrent's files
fn existing_files_for(matched: &TorrentSnapshot, files: &[FileEntry]) -> Vec<ExistingFile> {
    let base = Path::new(&matched.save_path);
    files
        .iter()
        .map(|f| ExistingFile {
            abs_path: base.join(&f.path),
            rel_path: f.path.clone(),
            size: f.size,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // =========================================================================
    // Pure decision helpers
    // =========================================================================

    #[test]
    fn test_merge_tags_dedup_and_marker() {
        let merged = merge_tags(
            &["tv".to_string(), " tv ".to_string(), "keep".to_string()],
            &["extra".to_string()],
            true,
        );
        assert_eq!(merged, vec!["tv", "keep", "extra", "cross-seed"]);

        let without = merge_tags(&["tv".to_string()], &[], false);
        assert_eq!(without, vec!["tv"]);
    }

    #[test]
    fn test_auto_tmm_gates() {
        // All gates pass
        let (enable, _) = should_enable_auto_tmm("tv", true, false, Some("/downloads/tv"), "/downloads/tv");
        assert!(enable);

        // Empty category
        let (enable, _) = should_enable_auto_tmm("", true, false, None, "/x");
        assert!(!enable);

        // Matched torrent not auto-managed
        let (enable, _) = should_enable_auto_tmm("tv", false, false, None, "/x");
        assert!(!enable);

        // Indexer-supplied category
        let (enable, _) = should_enable_auto_tmm("tv", true, true, None, "/x");
        assert!(!enable);

        // Paths-match is informational, never blocking
        let (enable, paths_match) =
            should_enable_auto_tmm("tv", true, false, Some("/elsewhere"), "/downloads/tv");
        assert!(enable);
        assert!(!paths_match);
    }

    #[test]
    fn test_has_extra_source_files() {
        let matched = vec![
            FileEntry { path: "Pack/a.mkv".to_string(), size: 100 },
            FileEntry { path: "Pack/bonus.mkv".to_string(), size: 50 },
            FileEntry { path: "Pack/release.nfo".to_string(), size: 5 },
        ];
        let new_files = vec![FileEntry { path: "Other/a.mkv".to_string(), size: 100 }];
        let patterns = vec![".nfo".to_string()];

        // bonus.mkv has no counterpart and is not ignorable
        assert!(has_extra_source_files(&matched, &new_files, &patterns));

        let new_with_bonus = vec![
            FileEntry { path: "Other/a.mkv".to_string(), size: 100 },
            FileEntry { path: "Other/bonus.mkv".to_string(), size: 50 },
        ];
        assert!(!has_extra_source_files(&matched, &new_with_bonus, &patterns));
    }

    #[test]
    fn test_determine_save_path_prefers_properties() {
        let rel = crate::release::parse_release("Show.S01E05.1080p.WEB-DL");
        let pack = crate::release::parse_release("Show.S01.1080p.WEB-DL.x264-GRP");
        let snapshot = TorrentSnapshot {
            save_path: "/snapshot".to_string(),
            ..Default::default()
        };
        let props = TorrentProperties {
            save_path: "/props".to_string(),
            ..Default::default()
        };
        assert_eq!(determine_save_path(&rel, &pack, &snapshot, &props), "/props");

        let empty_props = TorrentProperties::default();
        assert_eq!(
            determine_save_path(&rel, &pack, &snapshot, &empty_props),
            "/snapshot"
        );
    }

    #[test]
    fn test_status_display_strings() {
        assert_eq!(CrossSeedStatus::RequiresHardlinkReflink.to_string(), "requires_hardlink_reflink");
        assert_eq!(CrossSeedStatus::AddedHardlink.to_string(), "added_hardlink");
        assert_eq!(CrossSeedStatus::ReflinkError.to_string(), "reflink_error");
    }
}
