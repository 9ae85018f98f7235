//! File-list compatibility
//!
//! `get_match_type` classifies how two file lists relate; the per-file
//! release keys are enriched with torrent-level fields so a pack whose file
//! names omit the group or resolution still keys correctly.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::client::FileEntry;
use crate::layout::{TorrentLayout, classify_layout};
use crate::release::parser::normalize_title;
use crate::release::{ParsedRelease, ReleaseCache, ReleaseKey};
use crate::util::paths::{base_name, file_stem, normalize_path};

use super::MatchType;

/// Fraction of one side's keys that must appear in the other for a partial
/// classification
const PARTIAL_MATCH_THRESHOLD: f64 = 0.8;

/// Embedded anime episode number of the form " - 103 "
static EMBEDDED_EPISODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" - (\d{1,4})(?: |$|\.)").unwrap());

/// Whether a file matches any ignore pattern.
///
/// Patterns with glob metacharacters match the file's basename as a glob;
/// anything else is a suffix. Both forms are case-insensitive.
pub fn should_ignore_file(path: &str, patterns: &[String]) -> bool {
    let name = base_name(path);
    patterns.iter().any(|pattern| {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return false;
        }
        if pattern.contains('*') || pattern.contains('?') {
            glob_matches(name, pattern)
        } else {
            name.to_lowercase().ends_with(&pattern.to_lowercase())
        }
    })
}

fn glob_matches(name: &str, pattern: &str) -> bool {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push_str("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).map(|re| re.is_match(name)).unwrap_or(false)
}

/// Classify how two file lists relate.
///
/// Returns `None` when nothing usable lines up; the caller treats that as
/// no-match.
pub fn get_match_type(
    cache: &ReleaseCache,
    s_rel: &ParsedRelease,
    c_rel: &ParsedRelease,
    s_files: &[FileEntry],
    c_files: &[FileEntry],
    ignore_patterns: &[String],
) -> Option<MatchType> {
    // Layout gate: an archive release never matches an extracted one
    let s_layout = classify_layout(s_files, ignore_patterns);
    let c_layout = classify_layout(c_files, ignore_patterns);
    if s_layout != TorrentLayout::Unknown
        && c_layout != TorrentLayout::Unknown
        && s_layout != c_layout
    {
        return None;
    }

    let s_kept = filter_ignored(s_files, ignore_patterns);
    let c_kept = filter_ignored(c_files, ignore_patterns);

    let s_paths = path_size_map(&s_kept);
    let c_paths = path_size_map(&c_kept);
    if !s_paths.is_empty() && s_paths == c_paths {
        return Some(MatchType::Exact);
    }

    let s_keys = file_release_keys(cache, s_rel, &s_kept);
    let c_keys = file_release_keys(cache, c_rel, &c_kept);

    if !s_keys.is_empty() && !c_keys.is_empty() {
        let source_hits = s_keys
            .iter()
            .filter(|(key, size)| c_keys.get(*key) == Some(size))
            .count();
        if source_hits as f64 / s_keys.len() as f64 >= PARTIAL_MATCH_THRESHOLD {
            return Some(MatchType::PartialInPack);
        }

        let candidate_hits = c_keys
            .iter()
            .filter(|(key, size)| s_keys.get(*key) == Some(size))
            .count();
        if candidate_hits as f64 / c_keys.len() as f64 >= PARTIAL_MATCH_THRESHOLD {
            return Some(MatchType::PartialContains);
        }
    }

    let s_total: i64 = s_kept.iter().map(|f| f.size).sum();
    let c_total: i64 = c_kept.iter().map(|f| f.size).sum();
    if s_total > 0 && s_total == c_total {
        return Some(MatchType::Size);
    }

    // Name-and-size fallback when neither side produced usable keys. A tie
    // for the largest file makes the fallback abstain; with two equally
    // plausible files there is nothing safe to conclude.
    if s_keys.is_empty() && c_keys.is_empty() {
        if let (Some(s_largest), Some(c_largest)) =
            (unique_largest(&s_kept), unique_largest(&c_kept))
        {
            if s_largest.size == c_largest.size
                && file_stem(&s_largest.path).eq_ignore_ascii_case(file_stem(&c_largest.path))
            {
                return Some(MatchType::Size);
            }
        }
    }

    None
}

/// Title-driven pre-filter used before the desired torrent's file list is
/// known. Works entirely from the candidate's files plus the two names.
pub fn get_match_type_from_title(
    cache: &ReleaseCache,
    target_name: &str,
    candidate_name: &str,
    target_rel: &ParsedRelease,
    candidate_rel: &ParsedRelease,
    candidate_files: &[FileEntry],
    ignore_patterns: &[String],
) -> Option<MatchType> {
    let kept = filter_ignored(candidate_files, ignore_patterns);
    let candidate_keys = file_release_keys(cache, candidate_rel, &kept);

    if !candidate_keys.is_empty() {
        let target_key = target_rel.release_key();
        if !target_key.is_empty() && candidate_keys.contains_key(&target_key) {
            return Some(MatchType::PartialInPack);
        }

        if target_rel.is_season_pack() {
            let series = target_rel.series.unwrap_or(0);
            let has_episode_of_season = candidate_keys
                .keys()
                .any(|key| matches!(key, ReleaseKey::Episode { series: s, .. } if *s == series));
            if has_episode_of_season {
                return Some(MatchType::PartialContains);
            }
        }

        return None;
    }

    // No usable per-file keys: fall back to the anime absolute episode
    // number embedded in the raw names, when the titles agree.
    if normalize_title(&target_rel.title) == normalize_title(&candidate_rel.title) {
        if let (Some(target_ep), Some(candidate_ep)) = (
            embedded_episode_number(target_name),
            embedded_episode_number(candidate_name),
        ) {
            if target_ep == candidate_ep {
                return Some(MatchType::ReleaseMatch);
            }
        }
    }

    None
}

/// Build the per-file release-key → size map, enriching each file's parse
/// with torrent-level fields. The first file claiming a key wins.
pub fn file_release_keys(
    cache: &ReleaseCache,
    torrent_rel: &ParsedRelease,
    files: &[FileEntry],
) -> HashMap<ReleaseKey, i64> {
    let mut keys = HashMap::new();
    for file in files {
        let file_rel = cache.parse(base_name(&file.path));
        let enriched = enrich_from_torrent(&file_rel, torrent_rel);
        let key = enriched.release_key();
        if !key.is_empty() {
            keys.entry(key).or_insert(file.size);
        }
    }
    keys
}

/// Fill missing fields of a per-file parse from the torrent-level parse
fn enrich_from_torrent(file_rel: &ParsedRelease, torrent_rel: &ParsedRelease) -> ParsedRelease {
    let mut enriched = file_rel.clone();
    if enriched.group.is_none() {
        enriched.group = torrent_rel.group.clone();
    }
    if enriched.resolution.is_none() {
        enriched.resolution = torrent_rel.resolution.clone();
    }
    if enriched.codec.is_empty() {
        enriched.codec = torrent_rel.codec.clone();
    }
    if enriched.audio.is_empty() {
        enriched.audio = torrent_rel.audio.clone();
    }
    if enriched.source.is_none() {
        enriched.source = torrent_rel.source.clone();
    }
    if enriched.hdr.is_empty() {
        enriched.hdr = torrent_rel.hdr.clone();
    }
    if enriched.series.is_none() {
        enriched.series = torrent_rel.series;
    }
    if enriched.year.is_none() {
        enriched.year = torrent_rel.year;
    }
    enriched
}

fn filter_ignored(files: &[FileEntry], patterns: &[String]) -> Vec<FileEntry> {
    files
        .iter()
        .filter(|f| !should_ignore_file(&f.path, patterns))
        .cloned()
        .collect()
}

fn path_size_map(files: &[FileEntry]) -> BTreeMap<String, i64> {
    files
        .iter()
        .map(|f| (normalize_path(&f.path), f.size))
        .collect()
}

fn unique_largest(files: &[FileEntry]) -> Option<&FileEntry> {
    let max = files.iter().map(|f| f.size).max()?;
    let mut at_max = files.iter().filter(|f| f.size == max);
    let first = at_max.next()?;
    if at_max.next().is_some() {
        return None;
    }
    Some(first)
}

fn embedded_episode_number(name: &str) -> Option<u32> {
    EMBEDDED_EPISODE_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::parse_release;

    fn entry(path: &str, size: i64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size,
        }
    }

    fn cache() -> ReleaseCache {
        ReleaseCache::default()
    }

    // =========================================================================
    // Ignore patterns
    // =========================================================================

    #[test]
    fn test_suffix_ignore_is_case_insensitive() {
        assert!(should_ignore_file("x.Nfo", &[".nfo".to_string()]));
        assert!(should_ignore_file("release/info.NFO", &[".nfo".to_string()]));
        assert!(!should_ignore_file("episode.mkv", &[".nfo".to_string()]));
    }

    #[test]
    fn test_glob_ignore_is_case_insensitive() {
        let patterns = vec!["*sample*".to_string()];
        assert!(should_ignore_file("Movie.SAMPLE.mkv", &patterns));
        assert!(should_ignore_file("extras/sample-clip.mkv", &patterns));
        assert!(!should_ignore_file("Movie.mkv", &patterns));
    }

    // =========================================================================
    // get_match_type
    // =========================================================================

    #[test]
    fn test_exact_when_path_size_maps_agree() {
        let rel = parse_release("The Green Mile 1999 BluRay 1080p x264-VietHD");
        let files = vec![
            entry("The Green Mile 1999/movie.mkv", 1234),
            entry("The Green Mile 1999/extra.mkv", 200),
        ];
        let result = get_match_type(&cache(), &rel, &rel, &files, &files, &[]);
        assert_eq!(result, Some(MatchType::Exact));
    }

    #[test]
    fn test_exact_ignores_filtered_files() {
        let rel = parse_release("The Green Mile 1999 BluRay 1080p x264-VietHD");
        let a = vec![entry("movie/film.mkv", 1234), entry("movie/release.nfo", 9)];
        let b = vec![entry("movie/film.mkv", 1234)];
        let patterns = vec![".nfo".to_string()];
        let result = get_match_type(&cache(), &rel, &rel, &a, &b, &patterns);
        assert_eq!(result, Some(MatchType::Exact));
    }

    #[test]
    fn test_episode_within_pack_is_partial_in_pack() {
        let cache = cache();
        let episode_rel = parse_release("Show.S01E05.1080p.WEB-DL.x264-GROUP");
        let pack_rel = parse_release("Show.S01.1080p.WEB-DL.x264-GROUP");

        let episode_files = vec![entry("Show.S01E05.1080p.WEB-DL.x264-GROUP.mkv", 500)];
        let pack_files: Vec<FileEntry> = (1..=10)
            .map(|e| {
                entry(
                    &format!("Show.S01/Show.S01E{:02}.1080p.WEB-DL.x264-GROUP.mkv", e),
                    500,
                )
            })
            .collect();

        let result = get_match_type(
            &cache,
            &episode_rel,
            &pack_rel,
            &episode_files,
            &pack_files,
            &[],
        );
        assert_eq!(result, Some(MatchType::PartialInPack));

        // And the containment direction
        let result = get_match_type(
            &cache,
            &pack_rel,
            &episode_rel,
            &pack_files,
            &episode_files,
            &[],
        );
        assert_eq!(result, Some(MatchType::PartialContains));
    }

    #[test]
    fn test_size_match_when_totals_agree() {
        let rel_a = parse_release("Concert Recording 2019");
        let rel_b = parse_release("Concert Recording 2019 Alt");
        let a = vec![entry("Disc/a.bin", 700), entry("Disc/b.bin", 300)];
        let b = vec![entry("Other/x.bin", 600), entry("Other/y.bin", 400)];
        let result = get_match_type(&cache(), &rel_a, &rel_b, &a, &b, &[]);
        assert_eq!(result, Some(MatchType::Size));
    }

    #[test]
    fn test_largest_file_fallback_requires_unique_largest() {
        let rel = parse_release("Album Rip");
        // Ambiguous: two files tie for largest on the source side
        let a = vec![entry("Disc/Track01.flac", 500), entry("Disc/Track02.flac", 500)];
        let b = vec![entry("Other/t1.flac", 500), entry("Other/t2.flac", 400)];
        let result = get_match_type(&cache(), &rel, &rel, &a, &b, &[]);
        assert_eq!(result, None);
    }

    #[test]
    fn test_largest_file_fallback_matches_on_stem() {
        let rel = parse_release("Album Rip");
        let a = vec![entry("A/Main Feature.bin", 900), entry("A/extra.bin", 50)];
        let b = vec![entry("B/main feature.bin", 900), entry("B/other.bin", 10)];
        let result = get_match_type(&cache(), &rel, &rel, &a, &b, &[]);
        assert_eq!(result, Some(MatchType::Size));
    }

    #[test]
    fn test_layout_gate_blocks_archive_vs_files() {
        let rel = parse_release("Some Release 2020");
        let archives = vec![entry("release/archive.rar", 500), entry("release/archive.r00", 500)];
        let files = vec![entry("release/movie.mkv", 1000)];
        let result = get_match_type(&cache(), &rel, &rel, &archives, &files, &[]);
        assert_eq!(result, None);
    }

    // =========================================================================
    // get_match_type_from_title
    // =========================================================================

    #[test]
    fn test_title_prefilter_finds_episode_in_pack() {
        let cache = cache();
        let target_rel = parse_release("Show.S01E05.1080p.WEB-DL");
        let candidate_rel = parse_release("Show.S01.1080p.WEB-DL.x264-GROUP");
        let pack_files: Vec<FileEntry> = (1..=10)
            .map(|e| {
                entry(
                    &format!("Show.S01/Show.S01E{:02}.1080p.WEB-DL.x264-GROUP.mkv", e),
                    500,
                )
            })
            .collect();

        let result = get_match_type_from_title(
            &cache,
            "Show.S01E05.1080p.WEB-DL",
            "Show.S01.1080p.WEB-DL.x264-GROUP",
            &target_rel,
            &candidate_rel,
            &pack_files,
            &[],
        );
        assert_eq!(result, Some(MatchType::PartialInPack));
    }

    #[test]
    fn test_title_prefilter_pack_target_finds_contained_episode() {
        let cache = cache();
        let target_rel = parse_release("Show.S01.1080p.WEB-DL.x264-GROUP");
        let candidate_rel = parse_release("Show.S01E03.1080p.WEB-DL.x264-GROUP");
        let candidate_files = vec![entry("Show.S01E03.1080p.WEB-DL.x264-GROUP.mkv", 500)];

        let result = get_match_type_from_title(
            &cache,
            "Show.S01.1080p.WEB-DL.x264-GROUP",
            "Show.S01E03.1080p.WEB-DL.x264-GROUP",
            &target_rel,
            &candidate_rel,
            &candidate_files,
            &[],
        );
        assert_eq!(result, Some(MatchType::PartialContains));
    }

    #[test]
    fn test_title_prefilter_anime_absolute_number_fallback() {
        let cache = cache();
        let target_name = "[SubsPlease] Frieren - 103 (1080p)";
        let candidate_name = "[Alt-Raws] Frieren - 103 (1080p)";
        let target_rel = parse_release(target_name);
        let candidate_rel = parse_release(candidate_name);
        // Opaque file name that parses to nothing
        let candidate_files = vec![entry("frieren_103.mkv", 700)];

        let result = get_match_type_from_title(
            &cache,
            target_name,
            candidate_name,
            &target_rel,
            &candidate_rel,
            &candidate_files,
            &[],
        );
        assert_eq!(result, Some(MatchType::ReleaseMatch));
    }
}
