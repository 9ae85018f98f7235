//! Rename planning and post-add alignment
//!
//! Maps each file of a newly added torrent onto a matched torrent's layout
//! so the client can attach to the existing bytes. The rule throughout:
//! never silently guess when two candidates are equally plausible.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{FileEntry, TorrentClient, TorrentFilter};
use crate::release::ParsedRelease;
use crate::util::paths::{base_name, normalize_path, normalized_file_key};

use super::detect_common_root;

/// One planned rename inside a torrent's file tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEntry {
    pub old_path: String,
    pub new_path: String,
}

impl RenameEntry {
    /// Whether applying this entry would change anything
    pub fn is_noop(&self) -> bool {
        self.old_path == self.new_path
    }
}

/// Complete plan for aligning a torrent's paths to a candidate's layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenamePlan {
    /// Folder rename applied before any file renames
    pub root_rename: Option<RenameEntry>,
    /// Per-file renames, ordered by old path; old paths are post-root-rename
    pub entries: Vec<RenameEntry>,
    /// Source files that could not be mapped unambiguously
    pub unmatched: Vec<String>,
}

/// Rewrite a path after a root-folder rename.
///
/// Inverse of itself with the roots swapped: adjusting there and back yields
/// the original path.
pub fn adjust_path_for_root_rename(path: &str, old_root: &str, new_root: &str) -> String {
    let normalized = normalize_path(path);
    if normalized == old_root {
        return new_root.to_string();
    }
    let prefix = format!("{}/", old_root);
    if let Some(rest) = normalized.strip_prefix(&prefix) {
        return format!("{}/{}", new_root, rest);
    }
    normalized
}

/// Map each source file to a candidate file of the same size.
///
/// Preference order per source file: identical full path, unique basename
/// match, unique normalized-key match, sole remaining same-size candidate.
/// Anything still ambiguous is reported unmatched rather than guessed.
pub fn build_file_rename_plan(source: &[FileEntry], candidate: &[FileEntry]) -> RenamePlan {
    let mut plan = RenamePlan::default();

    let source_root = detect_common_root(source);
    let candidate_root = detect_common_root(candidate);
    if let (Some(s_root), Some(c_root)) = (&source_root, &candidate_root) {
        if s_root != c_root {
            plan.root_rename = Some(RenameEntry {
                old_path: s_root.clone(),
                new_path: c_root.clone(),
            });
        }
    }

    // Candidate files bucketed by exact size
    let mut by_size: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, file) in candidate.iter().enumerate() {
        by_size.entry(file.size).or_default().push(idx);
    }
    let mut used: HashSet<usize> = HashSet::new();

    for file in source {
        let source_path = match (&plan.root_rename, &source_root) {
            (Some(rename), Some(_)) => {
                adjust_path_for_root_rename(&file.path, &rename.old_path, &rename.new_path)
            }
            _ => normalize_path(&file.path),
        };

        let Some(bucket) = by_size.get(&file.size) else {
            plan.unmatched.push(source_path);
            continue;
        };
        let unused: Vec<usize> = bucket
            .iter()
            .copied()
            .filter(|idx| !used.contains(idx))
            .collect();
        if unused.is_empty() {
            plan.unmatched.push(source_path);
            continue;
        }

        let chosen = pick_candidate(&source_path, candidate, &unused);
        match chosen {
            Some(idx) => {
                used.insert(idx);
                plan.entries.push(RenameEntry {
                    old_path: source_path,
                    new_path: normalize_path(&candidate[idx].path),
                });
            }
            None => plan.unmatched.push(source_path),
        }
    }

    plan.entries.sort_by(|a, b| a.old_path.cmp(&b.old_path));
    plan
}

fn pick_candidate(source_path: &str, candidate: &[FileEntry], unused: &[usize]) -> Option<usize> {
    // Identical full path
    if let Some(idx) = unused
        .iter()
        .copied()
        .find(|&idx| normalize_path(&candidate[idx].path) == source_path)
    {
        return Some(idx);
    }

    // Unique basename match
    let source_base = base_name(source_path).to_lowercase();
    let base_hits: Vec<usize> = unused
        .iter()
        .copied()
        .filter(|&idx| base_name(&candidate[idx].path).to_lowercase() == source_base)
        .collect();
    if base_hits.len() == 1 {
        return Some(base_hits[0]);
    }

    // Unique normalized-key match
    let source_key = normalized_file_key(source_path);
    let key_hits: Vec<usize> = unused
        .iter()
        .copied()
        .filter(|&idx| normalized_file_key(&candidate[idx].path) == source_key)
        .collect();
    if key_hits.len() == 1 {
        return Some(key_hits[0]);
    }

    // Sole remaining candidate of this size
    if unused.len() == 1 {
        return Some(unused[0]);
    }

    None
}

/// Whether a plan would actually change anything on the client
pub fn files_need_renaming(plan: &RenamePlan) -> bool {
    plan.root_rename.as_ref().is_some_and(|r| !r.is_noop())
        || plan.entries.iter().any(|e| !e.is_noop())
}

/// Coarse predicate: is alignment worth attempting at all?
pub fn needs_rename_alignment(
    source_name: &str,
    candidate_name: &str,
    source_files: &[FileEntry],
    candidate_files: &[FileEntry],
) -> bool {
    if source_name != candidate_name {
        return true;
    }
    files_need_renaming(&build_file_rename_plan(source_files, candidate_files))
}

/// Never rename an episode torrent's display to a season pack's name; in
/// every other pairing the display follows the matched torrent.
pub fn should_rename_torrent_display(
    new_release: &ParsedRelease,
    matched_release: &ParsedRelease,
) -> bool {
    !(new_release.is_single_episode() && matched_release.is_season_pack())
}

/// Same rule for file alignment: an episode's files never get folded into a
/// season pack's layout.
pub fn should_align_files_with_candidate(
    new_release: &ParsedRelease,
    matched_release: &ParsedRelease,
) -> bool {
    !(new_release.is_single_episode() && matched_release.is_season_pack())
}

/// Fraction of source bytes that have a same-size counterpart in the
/// candidate. Sizes are consumed as they match, so a candidate file only
/// vouches for one source file.
pub fn calculate_expected_progress(source: &[FileEntry], candidate: &[FileEntry]) -> f64 {
    let total: i64 = source.iter().map(|f| f.size).sum();
    if total <= 0 {
        return 0.0;
    }

    let mut available: HashMap<i64, usize> = HashMap::new();
    for file in candidate {
        *available.entry(file.size).or_insert(0) += 1;
    }

    let mut matched: i64 = 0;
    for file in source {
        if let Some(count) = available.get_mut(&file.size) {
            if *count > 0 {
                *count -= 1;
                matched += file.size;
            }
        }
    }

    (matched as f64 / total as f64).clamp(0.0, 1.0)
}

/// Timing knobs for the post-add alignment poll
#[derive(Debug, Clone)]
pub struct AlignmentConfig {
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// What the alignment pass actually changed
#[derive(Debug, Clone, Default)]
pub struct AlignmentReport {
    pub display_renamed: bool,
    pub root_renamed: bool,
    pub files_renamed: usize,
}

/// Apply display, root-folder, and per-file renames once the newly added
/// torrent becomes visible on the client.
///
/// Individual rename failures are logged and skipped; only never seeing the
/// torrent at all is an error.
pub async fn align_added_torrent(
    client: &dyn TorrentClient,
    instance_id: i64,
    hash: &str,
    desired_display: Option<&str>,
    plan: &RenamePlan,
    config: &AlignmentConfig,
) -> Result<AlignmentReport> {
    wait_for_visibility(client, instance_id, hash, config).await?;

    let mut report = AlignmentReport::default();

    if let Some(display) = desired_display {
        match client.rename_torrent(instance_id, hash, display).await {
            Ok(()) => report.display_renamed = true,
            Err(e) => warn!(hash, error = %e, "Display rename failed, continuing"),
        }
    }

    if let Some(root) = &plan.root_rename {
        if !root.is_noop() {
            match client
                .rename_torrent_folder(instance_id, hash, &root.old_path, &root.new_path)
                .await
            {
                Ok(()) => report.root_renamed = true,
                Err(e) => warn!(hash, error = %e, "Root folder rename failed, continuing"),
            }
        }
    }

    for entry in &plan.entries {
        if entry.is_noop() {
            continue;
        }
        match client
            .rename_torrent_file(instance_id, hash, &entry.old_path, &entry.new_path)
            .await
        {
            Ok(()) => report.files_renamed += 1,
            Err(e) => warn!(
                hash,
                old_path = %entry.old_path,
                new_path = %entry.new_path,
                error = %e,
                "File rename failed, continuing"
            ),
        }
    }

    debug!(
        hash,
        display_renamed = report.display_renamed,
        root_renamed = report.root_renamed,
        files_renamed = report.files_renamed,
        "Alignment pass finished"
    );

    Ok(report)
}

async fn wait_for_visibility(
    client: &dyn TorrentClient,
    instance_id: i64,
    hash: &str,
    config: &AlignmentConfig,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + config.visibility_timeout;
    loop {
        let found = client
            .get_torrents(instance_id, TorrentFilter::Hashes(vec![hash.to_string()]))
            .await
            .context("Polling for added torrent")?;
        if !found.is_empty() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("Torrent {} did not appear within {:?}", hash, config.visibility_timeout);
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}
