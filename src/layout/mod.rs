//! Torrent layout classification and path alignment
//!
//! Classifies a torrent's file layout and, in [`rename`], computes the
//! rename plans that align a newly added torrent's paths to an existing
//! torrent's layout.

pub mod rename;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::FileEntry;
use crate::matching::files::should_ignore_file;
use crate::util::paths::first_segment;

pub use rename::{
    AlignmentConfig, AlignmentReport, RenameEntry, RenamePlan, adjust_path_for_root_rename,
    align_added_torrent, build_file_rename_plan, calculate_expected_progress,
    files_need_renaming, needs_rename_alignment, should_align_files_with_candidate,
    should_rename_torrent_display,
};

/// Extensions that mark multi-part or packed archives whose pieces must
/// stay colocated
pub const ARCHIVE_EXTENSIONS: &[&str] =
    &[".rar", ".zip", ".gz", ".7z", ".bz2", ".xz", ".tar"];

/// Split-archive volumes: .r00 through .r99
static SPLIT_VOLUME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.r\d{2}$").unwrap());

/// Broad shape of a torrent's file list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorrentLayout {
    /// Plain files, possibly under a root folder
    Files,
    /// RAR sets or other packed archives
    Archives,
    /// Nothing left after filtering
    Unknown,
}

impl std::fmt::Display for TorrentLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TorrentLayout::Files => write!(f, "files"),
            TorrentLayout::Archives => write!(f, "archives"),
            TorrentLayout::Unknown => write!(f, "unknown"),
        }
    }
}

/// Whether a file name indicates an archive
pub fn is_archive_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    ARCHIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        || SPLIT_VOLUME_RE.is_match(&lower)
}

/// Classify a torrent's file layout after stripping ignored files
pub fn classify_layout(files: &[FileEntry], ignore_patterns: &[String]) -> TorrentLayout {
    let mut any_kept = false;
    for file in files {
        if should_ignore_file(&file.path, ignore_patterns) {
            continue;
        }
        if is_archive_file(&file.path) {
            return TorrentLayout::Archives;
        }
        any_kept = true;
    }
    if any_kept {
        TorrentLayout::Files
    } else {
        TorrentLayout::Unknown
    }
}

/// The single directory component every file sits under, when there is one.
///
/// A single-file torrent (or any file without a separator) has no common
/// root, and disagreeing first segments mean no common root either.
pub fn detect_common_root(files: &[FileEntry]) -> Option<String> {
    let mut root: Option<&str> = None;
    for file in files {
        let segment = first_segment(&file.path)?;
        match root {
            None => root = Some(segment),
            Some(existing) if existing == segment => {}
            Some(_) => return None,
        }
    }
    root.map(|r| r.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: i64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size,
        }
    }

    #[test]
    fn test_classify_plain_files() {
        let files = vec![entry("Show.S01/e01.mkv", 100), entry("Show.S01/e02.mkv", 100)];
        assert_eq!(classify_layout(&files, &[]), TorrentLayout::Files);
    }

    #[test]
    fn test_classify_rar_set_as_archives() {
        let files = vec![
            entry("Release/movie.rar", 100),
            entry("Release/movie.r00", 100),
            entry("Release/movie.r01", 100),
        ];
        assert_eq!(classify_layout(&files, &[]), TorrentLayout::Archives);
    }

    #[test]
    fn test_classify_part_volume_as_archives() {
        let files = vec![entry("Release/movie.part01.rar", 100)];
        assert_eq!(classify_layout(&files, &[]), TorrentLayout::Archives);
    }

    #[test]
    fn test_classify_unknown_when_everything_ignored() {
        let files = vec![entry("release.nfo", 10)];
        assert_eq!(
            classify_layout(&files, &[".nfo".to_string()]),
            TorrentLayout::Unknown
        );
    }

    #[test]
    fn test_common_root_detected() {
        let files = vec![entry("Root/a.mkv", 1), entry("Root/sub/b.mkv", 2)];
        assert_eq!(detect_common_root(&files), Some("Root".to_string()));
    }

    #[test]
    fn test_no_common_root_for_single_file() {
        let files = vec![entry("movie.mkv", 1)];
        assert_eq!(detect_common_root(&files), None);
    }

    #[test]
    fn test_no_common_root_when_roots_disagree() {
        let files = vec![entry("A/a.mkv", 1), entry("B/b.mkv", 2)];
        assert_eq!(detect_common_root(&files), None);
    }

    #[test]
    fn test_no_common_root_when_any_file_is_rootless() {
        let files = vec![entry("A/a.mkv", 1), entry("b.mkv", 2)];
        assert_eq!(detect_common_root(&files), None);
    }
}
