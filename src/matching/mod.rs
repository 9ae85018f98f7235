//! Matching engine
//!
//! Decides whether two parsed releases refer to the same content and, given
//! file lists, at what fidelity. Pure logic: no I/O, no state beyond the
//! release cache handed in by callers.

pub mod files;
pub mod releases;
pub mod variants;

use serde::{Deserialize, Serialize};

pub use files::{get_match_type, get_match_type_from_title, should_ignore_file};
pub use releases::releases_match;
pub use variants::strict_variants;

/// Fidelity of a file-level match between two torrents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    /// Non-ignored path/size maps are identical
    Exact,
    /// The candidate is a pack containing the files the new torrent wants
    PartialInPack,
    /// The candidate's files are a subset of the new, larger torrent
    PartialContains,
    /// Total sizes agree (or the largest-file fallback fired)
    Size,
    /// The candidate shares a content path with the source
    ContentPath,
    /// Name-level evidence only, unverified by files
    ReleaseMatch,
}

impl MatchType {
    /// Ordering used when picking the best match:
    /// exact > partial-in-pack > partial-contains > size > content-path >
    /// release-match.
    pub fn rank(&self) -> u8 {
        match self {
            MatchType::Exact => 6,
            MatchType::PartialInPack => 5,
            MatchType::PartialContains => 4,
            MatchType::Size => 3,
            MatchType::ContentPath => 2,
            MatchType::ReleaseMatch => 1,
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchType::Exact => "exact",
            MatchType::PartialInPack => "partial-in-pack",
            MatchType::PartialContains => "partial-contains",
            MatchType::Size => "size",
            MatchType::ContentPath => "content-path",
            MatchType::ReleaseMatch => "release-match",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_ordering() {
        assert!(MatchType::Exact.rank() > MatchType::PartialInPack.rank());
        assert!(MatchType::PartialInPack.rank() > MatchType::PartialContains.rank());
        assert!(MatchType::PartialContains.rank() > MatchType::Size.rank());
        assert!(MatchType::Size.rank() > MatchType::ReleaseMatch.rank());
    }

    #[test]
    fn test_display_is_kebab_case() {
        assert_eq!(MatchType::PartialInPack.to_string(), "partial-in-pack");
        assert_eq!(MatchType::Exact.to_string(), "exact");
    }
}
