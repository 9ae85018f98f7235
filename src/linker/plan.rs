//! Link plan construction and destination shaping

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ContentLayout, FileEntry};
use crate::error::CrossSeedError;
use crate::layout::detect_common_root;
use crate::matching::files::should_ignore_file;
use crate::util::paths::{base_name, normalize_path};

use super::{LinkPlan, LinkPlanEntry};

/// A file already on disk that links can point at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingFile {
    pub abs_path: PathBuf,
    /// Path relative to the matched torrent's content root
    pub rel_path: String,
    pub size: i64,
}

/// Shape of the destination directory tree under the link base
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkDirPreset {
    #[default]
    Flat,
    ByTracker,
    ByInstance,
}

impl LinkDirPreset {
    /// Parse a stored preset name; anything unrecognized is treated as flat
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "by-tracker" | "by_tracker" => LinkDirPreset::ByTracker,
            "by-instance" | "by_instance" => LinkDirPreset::ByInstance,
            _ => LinkDirPreset::Flat,
        }
    }
}

/// Inputs for building a link plan
#[derive(Debug)]
pub struct LinkPlanRequest<'a> {
    pub torrent_files: &'a [FileEntry],
    pub existing: &'a [ExistingFile],
    pub layout: ContentLayout,
    pub display_name: &'a str,
    pub dest_dir: &'a Path,
    pub ignore_patterns: &'a [String],
    /// Reject the plan when the bytes left to download exceed this fraction
    /// of the torrent's total size
    pub max_download_fraction: Option<f64>,
}

/// Resolve every torrent file against the existing files and produce a plan.
///
/// Files without an on-disk counterpart are acceptable only when they match
/// an ignore pattern; anything else fails the plan. An ambiguous size-only
/// situation (several equally plausible existing files) is treated as
/// missing rather than guessed.
pub fn build_link_plan(req: &LinkPlanRequest<'_>) -> Result<LinkPlan> {
    if req.dest_dir.as_os_str().is_empty() {
        return Err(CrossSeedError::PlanInfeasible(
            "link destination directory is not configured".to_string(),
        )
        .into());
    }

    let common_root = detect_common_root(req.torrent_files);

    let mut by_size: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, file) in req.existing.iter().enumerate() {
        by_size.entry(file.size).or_default().push(idx);
    }
    let mut used: HashSet<usize> = HashSet::new();

    let mut plan = LinkPlan {
        root_dir: req.dest_dir.to_path_buf(),
        ..Default::default()
    };
    let mut download_bytes: i64 = 0;
    let total_bytes: i64 = req.torrent_files.iter().map(|f| f.size).sum();

    for file in req.torrent_files {
        let target_rel = shape_target_path(&file.path, req.layout, common_root.as_deref(), req.display_name);

        let matched = by_size
            .get(&file.size)
            .map(|bucket| {
                bucket
                    .iter()
                    .copied()
                    .filter(|idx| !used.contains(idx))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let chosen = pick_existing(&file.path, req.existing, &matched);
        match chosen {
            Some(idx) => {
                used.insert(idx);
                plan.entries.push(LinkPlanEntry {
                    source: req.existing[idx].abs_path.clone(),
                    target: req.dest_dir.join(&target_rel),
                    size: file.size,
                });
            }
            None => {
                if !should_ignore_file(&file.path, req.ignore_patterns) {
                    return Err(CrossSeedError::PlanInfeasible(format!(
                        "no matching file on disk for '{}' ({} bytes)",
                        file.path, file.size
                    ))
                    .into());
                }
                download_bytes += file.size;
                plan.download_files.push(normalize_path(&file.path));
            }
        }
    }

    if let Some(max_fraction) = req.max_download_fraction {
        if total_bytes > 0 {
            let fraction = download_bytes as f64 / total_bytes as f64;
            if fraction > max_fraction {
                return Err(CrossSeedError::PlanInfeasible(format!(
                    "{:.1}% of the torrent would need downloading (limit {:.1}%)",
                    fraction * 100.0,
                    max_fraction * 100.0
                ))
                .into());
            }
        }
    }

    debug!(
        entries = plan.entries.len(),
        download_files = plan.download_files.len(),
        root_dir = %plan.root_dir.display(),
        "Built link plan"
    );

    Ok(plan)
}

fn pick_existing(torrent_path: &str, existing: &[ExistingFile], unused: &[usize]) -> Option<usize> {
    if unused.is_empty() {
        return None;
    }

    let wanted_base = base_name(torrent_path).to_lowercase();
    let base_hits: Vec<usize> = unused
        .iter()
        .copied()
        .filter(|&idx| base_name(&existing[idx].rel_path).to_lowercase() == wanted_base)
        .collect();
    if base_hits.len() == 1 {
        return Some(base_hits[0]);
    }
    if base_hits.len() > 1 {
        return None;
    }

    if unused.len() == 1 {
        return Some(unused[0]);
    }

    None
}

/// Place a torrent-internal path under the destination according to the
/// requested content layout
fn shape_target_path(
    path: &str,
    layout: ContentLayout,
    common_root: Option<&str>,
    display_name: &str,
) -> String {
    let normalized = normalize_path(path);
    match layout {
        ContentLayout::Original => normalized,
        ContentLayout::NoSubfolder => match common_root {
            Some(root) => normalized
                .strip_prefix(&format!("{}/", root))
                .map(str::to_string)
                .unwrap_or(normalized),
            None => normalized,
        },
        ContentLayout::Subfolder => match common_root {
            Some(_) => normalized,
            None => format!("{}/{}", sanitize_component(display_name), normalized),
        },
    }
}

/// Build the destination directory for a torrent's links.
///
/// Torrents without a common root are isolated into their own folder so two
/// rootless torrents cannot collide on file names.
pub fn build_link_destination(
    base_dir: &str,
    preset: LinkDirPreset,
    torrent_name: &str,
    info_hash: &str,
    tracker_display: Option<&str>,
    instance_name: Option<&str>,
    has_common_root: bool,
) -> Result<PathBuf> {
    if base_dir.trim().is_empty() {
        return Err(CrossSeedError::PlanInfeasible(
            "link base directory is not configured".to_string(),
        )
        .into());
    }

    let base = PathBuf::from(base_dir);
    let isolation = isolation_folder(torrent_name, info_hash);

    let dest = match preset {
        LinkDirPreset::Flat => base.join(&isolation),
        LinkDirPreset::ByTracker => {
            let tracker = sanitize_component(tracker_display.unwrap_or("unknown-tracker"));
            let dir = base.join(tracker);
            if has_common_root { dir } else { dir.join(&isolation) }
        }
        LinkDirPreset::ByInstance => {
            let instance = sanitize_component(instance_name.unwrap_or("unknown-instance"));
            let dir = base.join(instance);
            if has_common_root { dir } else { dir.join(&isolation) }
        }
    };

    Ok(dest)
}

/// `<sanitized-name>--<8-char-hash-prefix>`
fn isolation_folder(torrent_name: &str, info_hash: &str) -> String {
    let hash = info_hash.to_lowercase();
    let prefix = hash.get(..8).unwrap_or(&hash);
    format!("{}--{}", sanitize_component(torrent_name), prefix)
}

/// Strip characters that are unsafe in a path component on any platform
fn sanitize_component(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' | '/') && !c.is_control())
        .collect();
    let sanitized = sanitize_filename::sanitize(cleaned.trim());
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn entry(path: &str, size: i64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size,
        }
    }

    fn existing(abs: &str, rel: &str, size: i64) -> ExistingFile {
        ExistingFile {
            abs_path: PathBuf::from(abs),
            rel_path: rel.to_string(),
            size,
        }
    }

    #[test]
    fn test_plan_links_every_file() {
        let torrent = vec![entry("Pack/a.mkv", 100), entry("Pack/b.mkv", 200)];
        let on_disk = vec![
            existing("/data/Pack/a.mkv", "Pack/a.mkv", 100),
            existing("/data/Pack/b.mkv", "Pack/b.mkv", 200),
        ];
        let req = LinkPlanRequest {
            torrent_files: &torrent,
            existing: &on_disk,
            layout: ContentLayout::Original,
            display_name: "Pack",
            dest_dir: Path::new("/links/Pack--deadbeef"),
            ignore_patterns: &[],
            max_download_fraction: None,
        };

        let plan = build_link_plan(&req).unwrap();
        assert_eq!(plan.entries.len(), 2);
        assert!(plan.download_files.is_empty());
        assert_eq!(plan.entries[0].target, PathBuf::from("/links/Pack--deadbeef/Pack/a.mkv"));
    }

    #[test]
    fn test_plan_fails_on_missing_non_ignorable_file() {
        let torrent = vec![entry("Pack/a.mkv", 100), entry("Pack/b.mkv", 200)];
        let on_disk = vec![existing("/data/Pack/a.mkv", "Pack/a.mkv", 100)];
        let req = LinkPlanRequest {
            torrent_files: &torrent,
            existing: &on_disk,
            layout: ContentLayout::Original,
            display_name: "Pack",
            dest_dir: Path::new("/links/x"),
            ignore_patterns: &[],
            max_download_fraction: None,
        };

        let err = build_link_plan(&req).unwrap_err();
        assert_matches!(
            CrossSeedError::find_in(&err),
            Some(CrossSeedError::PlanInfeasible(_))
        );
    }

    #[test]
    fn test_plan_allows_missing_ignorable_files() {
        let torrent = vec![entry("Pack/a.mkv", 100), entry("Pack/release.nfo", 9)];
        let on_disk = vec![existing("/data/Pack/a.mkv", "Pack/a.mkv", 100)];
        let req = LinkPlanRequest {
            torrent_files: &torrent,
            existing: &on_disk,
            layout: ContentLayout::Original,
            display_name: "Pack",
            dest_dir: Path::new("/links/x"),
            ignore_patterns: &[".nfo".to_string()],
            max_download_fraction: None,
        };

        let plan = build_link_plan(&req).unwrap();
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.download_files, vec!["Pack/release.nfo".to_string()]);
    }

    #[test]
    fn test_plan_rejects_excessive_download_fraction() {
        let torrent = vec![entry("Pack/a.mkv", 100), entry("Pack/big.sample.mkv", 900)];
        let on_disk = vec![existing("/data/Pack/a.mkv", "Pack/a.mkv", 100)];
        let req = LinkPlanRequest {
            torrent_files: &torrent,
            existing: &on_disk,
            layout: ContentLayout::Original,
            display_name: "Pack",
            dest_dir: Path::new("/links/x"),
            ignore_patterns: &["*sample*".to_string()],
            max_download_fraction: Some(0.10),
        };

        let err = build_link_plan(&req).unwrap_err();
        assert_matches!(
            CrossSeedError::find_in(&err),
            Some(CrossSeedError::PlanInfeasible(_))
        );
    }

    #[test]
    fn test_plan_refuses_ambiguous_size_only_match() {
        let torrent = vec![entry("Pack/a.bin", 500)];
        let on_disk = vec![
            existing("/data/Pack/x.bin", "Pack/x.bin", 500),
            existing("/data/Pack/y.bin", "Pack/y.bin", 500),
        ];
        let req = LinkPlanRequest {
            torrent_files: &torrent,
            existing: &on_disk,
            layout: ContentLayout::Original,
            display_name: "Pack",
            dest_dir: Path::new("/links/x"),
            ignore_patterns: &[],
            max_download_fraction: None,
        };

        let err = build_link_plan(&req).unwrap_err();
        assert_matches!(
            CrossSeedError::find_in(&err),
            Some(CrossSeedError::PlanInfeasible(_))
        );
    }

    #[test]
    fn test_plan_fails_without_destination() {
        let torrent = vec![entry("a.mkv", 100)];
        let req = LinkPlanRequest {
            torrent_files: &torrent,
            existing: &[],
            layout: ContentLayout::Original,
            display_name: "x",
            dest_dir: Path::new(""),
            ignore_patterns: &[],
            max_download_fraction: None,
        };

        let err = build_link_plan(&req).unwrap_err();
        assert_matches!(
            CrossSeedError::find_in(&err),
            Some(CrossSeedError::PlanInfeasible(_))
        );
    }

    // =========================================================================
    // Destination shaping
    // =========================================================================

    #[test]
    fn test_flat_destination() {
        let dest = build_link_destination(
            "/links",
            LinkDirPreset::Flat,
            "Some Torrent",
            "DEADBEEFCAFE0123",
            None,
            None,
            true,
        )
        .unwrap();
        assert_eq!(dest, PathBuf::from("/links/Some Torrent--deadbeef"));
    }

    #[test]
    fn test_by_tracker_isolates_rootless_torrents() {
        let rooted = build_link_destination(
            "/links",
            LinkDirPreset::ByTracker,
            "Pack",
            "deadbeefcafe",
            Some("MyTracker"),
            None,
            true,
        )
        .unwrap();
        assert_eq!(rooted, PathBuf::from("/links/MyTracker"));

        let rootless = build_link_destination(
            "/links",
            LinkDirPreset::ByTracker,
            "Single",
            "deadbeefcafe",
            Some("MyTracker"),
            None,
            false,
        )
        .unwrap();
        assert_eq!(rootless, PathBuf::from("/links/MyTracker/Single--deadbeef"));
    }

    #[test]
    fn test_destination_sanitizes_forbidden_characters() {
        let dest = build_link_destination(
            "/links",
            LinkDirPreset::Flat,
            "Name: with? <bad> chars|*",
            "0123456789abcdef",
            None,
            None,
            true,
        )
        .unwrap();
        let component = dest.file_name().unwrap().to_string_lossy().to_string();
        assert!(!component.contains([':', '?', '<', '>', '|', '*']));
        assert!(component.ends_with("--01234567"));
    }

    #[test]
    fn test_empty_base_dir_is_infeasible() {
        let err = build_link_destination("", LinkDirPreset::Flat, "x", "hash", None, None, true)
            .unwrap_err();
        assert_matches!(
            CrossSeedError::find_in(&err),
            Some(CrossSeedError::PlanInfeasible(_))
        );
    }

    #[test]
    fn test_unknown_preset_parses_as_flat() {
        assert_eq!(LinkDirPreset::parse("mystery"), LinkDirPreset::Flat);
        assert_eq!(LinkDirPreset::parse("by-tracker"), LinkDirPreset::ByTracker);
        assert_eq!(LinkDirPreset::parse("by_instance"), LinkDirPreset::ByInstance);
    }
}
