//! Release-level compatibility
//!
//! `releases_match` decides whether two parsed releases refer to the same
//! underlying release. It is a cascade of cheap gates; the first mismatch
//! wins. Absent fields never fail a gate on their own, with one deliberate
//! exception: a source release that names its group requires the candidate
//! to name the same group.

use crate::release::{ContentKind, ParsedRelease};
use crate::release::parser::normalize_title;

use super::variants::strict_variants_match;

/// Whether two parsed releases refer to the same underlying release.
///
/// `find_individual_episodes` relaxes the TV-structure gate so a season pack
/// can match a single episode of that season (in either direction); two
/// single episodes still require the same episode number.
pub fn releases_match(
    source: &ParsedRelease,
    candidate: &ParsedRelease,
    find_individual_episodes: bool,
) -> bool {
    let is_tv = source.is_tv() || candidate.is_tv();

    // Title
    let s_title = normalize_title(&source.title);
    let c_title = normalize_title(&candidate.title);
    if s_title.is_empty() || c_title.is_empty() {
        return false;
    }
    if is_tv {
        if s_title != c_title && !s_title.contains(&c_title) && !c_title.contains(&s_title) {
            return false;
        }
    } else if s_title != c_title {
        return false;
    }

    // Year
    if let (Some(s_year), Some(c_year)) = (source.year, candidate.year) {
        if s_year != c_year {
            return false;
        }
    }

    // Kind (non-TV only; a music release must not pair with an audiobook)
    if !is_tv
        && source.kind != ContentKind::Unknown
        && candidate.kind != ContentKind::Unknown
        && source.kind != candidate.kind
    {
        return false;
    }

    // TV structure
    if is_tv {
        let (Some(s_series), Some(c_series)) = (source.series, candidate.series) else {
            return false;
        };
        if s_series != c_series {
            return false;
        }

        let s_is_pack = source.is_season_pack();
        let c_is_pack = candidate.is_season_pack();

        if find_individual_episodes {
            if !s_is_pack && !c_is_pack && source.episode != candidate.episode {
                return false;
            }
        } else {
            if s_is_pack != c_is_pack {
                return false;
            }
            if !s_is_pack && source.episode != candidate.episode {
                return false;
            }
        }
    }

    // Release group: the source's choice of group is binding
    if let Some(s_group) = source.group.as_deref().filter(|g| !g.is_empty()) {
        match candidate.group.as_deref() {
            Some(c_group) if c_group.eq_ignore_ascii_case(s_group) => {}
            _ => return false,
        }
    }

    // Scalar quality fields: both present => equal
    if !optional_eq_ignore_case(&source.source, &candidate.source) {
        return false;
    }
    if !optional_eq_ignore_case(&source.resolution, &candidate.resolution) {
        return false;
    }
    if !optional_eq_ignore_case(&source.collection, &candidate.collection) {
        return false;
    }
    if !optional_eq_ignore_case(&source.channels, &candidate.channels) {
        return false;
    }

    // Set-valued fields: both non-empty => same normalized set
    if !set_eq(&source.codec, &candidate.codec) {
        return false;
    }
    if !set_eq(&source.audio, &candidate.audio) {
        return false;
    }
    if !set_eq(&source.hdr, &candidate.hdr) {
        return false;
    }
    if !set_eq(&source.cut, &candidate.cut) {
        return false;
    }
    if !set_eq(&source.edition, &candidate.edition) {
        return false;
    }

    // Strict variants must agree in both directions
    if !strict_variants_match(source, candidate) {
        return false;
    }

    // Fansub site and CRC32 checksum, when both sides provide them
    if !optional_eq_ignore_case(&source.site, &candidate.site) {
        return false;
    }
    if !optional_eq_ignore_case(&source.sum, &candidate.sum) {
        return false;
    }

    true
}

/// Equal (case-insensitive) when both sides carry a value; otherwise pass
fn optional_eq_ignore_case(a: &Option<String>, b: &Option<String>) -> bool {
    match (a.as_deref(), b.as_deref()) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => a.eq_ignore_ascii_case(b),
        _ => true,
    }
}

/// Same normalized (uppercase, sorted, joined) set when both non-empty
fn set_eq(a: &[String], b: &[String]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    normalized_set(a) == normalized_set(b)
}

fn normalized_set(values: &[String]) -> String {
    let mut upper: Vec<String> = values.iter().map(|v| v.trim().to_uppercase()).collect();
    upper.sort();
    upper.dedup();
    upper.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::parse_release;

    // =========================================================================
    // Movie matching
    // =========================================================================

    #[test]
    fn test_movie_punctuation_only_difference() {
        let spaced = parse_release("The Green Mile 1999 BluRay 1080p DTS 5.1 x264-VietHD");
        let dotted = parse_release("The.Green.Mile.1999.BluRay.1080p.DTS.5.1.x264-VietHD");
        assert!(releases_match(&spaced, &dotted, false));
        assert!(releases_match(&dotted, &spaced, false));
    }

    #[test]
    fn test_movie_year_mismatch_fails() {
        let a = parse_release("Heat.1995.1080p.BluRay.x264-GRP");
        let b = parse_release("Heat.2023.1080p.BluRay.x264-GRP");
        assert!(!releases_match(&a, &b, false));
    }

    #[test]
    fn test_movie_resolution_mismatch_fails() {
        let a = parse_release("Heat.1995.1080p.BluRay.x264-GRP");
        let b = parse_release("Heat.1995.720p.BluRay.x264-GRP");
        assert!(!releases_match(&a, &b, false));
    }

    #[test]
    fn test_source_group_is_binding() {
        let with_group = parse_release("Heat.1995.1080p.BluRay.x264-GRP");
        let other_group = parse_release("Heat.1995.1080p.BluRay.x264-OTHER");
        assert!(!releases_match(&with_group, &other_group, false));

        let same_group_cased = parse_release("Heat.1995.1080p.BluRay.x264-grp");
        assert!(releases_match(&with_group, &same_group_cased, false));
    }

    #[test]
    fn test_reflexive_for_nonempty_title() {
        let rel = parse_release("Show.S03E07.720p.HDTV.x264-GRP");
        assert!(releases_match(&rel, &rel, false));
        assert!(releases_match(&rel, &rel, true));
    }

    #[test]
    fn test_symmetric_on_fully_specified_releases() {
        let a = parse_release("Show.S03E07.720p.HDTV.x264-GRP");
        let b = parse_release("Show S03E07 720p HDTV x264-GRP");
        assert_eq!(releases_match(&a, &b, false), releases_match(&b, &a, false));
        assert!(releases_match(&a, &b, false));
    }

    // =========================================================================
    // TV structure
    // =========================================================================

    #[test]
    fn test_episode_in_pack_requires_flag() {
        let episode = parse_release("Show.S01E05.1080p.WEB-DL.x264-GRP");
        let pack = parse_release("Show.S01.1080p.WEB-DL.x264-GRP");

        assert!(!releases_match(&episode, &pack, false));
        assert!(releases_match(&episode, &pack, true));
        assert!(releases_match(&pack, &episode, true));
    }

    #[test]
    fn test_two_episodes_need_same_number_even_with_flag() {
        let e5 = parse_release("Show.S01E05.1080p.WEB-DL.x264-GRP");
        let e6 = parse_release("Show.S01E06.1080p.WEB-DL.x264-GRP");
        assert!(!releases_match(&e5, &e6, true));
        assert!(!releases_match(&e5, &e6, false));
    }

    #[test]
    fn test_series_number_mismatch_fails() {
        let s1 = parse_release("Show.S01E05.1080p.WEB-DL.x264-GRP");
        let s2 = parse_release("Show.S02E05.1080p.WEB-DL.x264-GRP");
        assert!(!releases_match(&s1, &s2, true));
    }

    #[test]
    fn test_tv_against_non_tv_fails() {
        let episode = parse_release("Show.S01E05.1080p.WEB-DL.x264-GRP");
        let movie = parse_release("Show.2020.1080p.WEB-DL.x264-GRP");
        assert!(!releases_match(&episode, &movie, true));
    }

    #[test]
    fn test_tv_title_substring_allowed() {
        let short = parse_release("Show.S01E05.1080p.WEB-DL.x264-GRP");
        let long = parse_release("Show Extended Title S01E05 1080p WEB-DL x264-GRP");
        assert!(releases_match(&short, &long, false));
    }

    // =========================================================================
    // Strict variants and anime fields
    // =========================================================================

    #[test]
    fn test_imax_variant_guard_both_directions() {
        let mut with_imax = parse_release("The.Conjuring.Last.Rites.2025.BluRay.1080p");
        with_imax.collection = Some("IMAX".to_string());
        let without = parse_release("The.Conjuring.Last.Rites.2025.BluRay.1080p");

        assert!(!releases_match(&with_imax, &without, false));
        assert!(!releases_match(&without, &with_imax, false));
    }

    #[test]
    fn test_checksum_mismatch_fails() {
        let a = parse_release("[SubsPlease] Frieren S06E11 (1080p) [32ECE75A].mkv");
        let b = parse_release("[SubsPlease] Frieren S06E11 (1080p) [DEADBEEF].mkv");
        assert!(!releases_match(&a, &b, false));

        let same = parse_release("[SubsPlease] Frieren S06E11 (1080p) [32ECE75A].mkv");
        assert!(releases_match(&a, &same, false));
    }

    #[test]
    fn test_site_mismatch_fails() {
        let a = parse_release("[SubsPlease] Frieren S06E11 (1080p) [32ECE75A].mkv");
        let b = parse_release("[Erai-raws] Frieren S06E11 (1080p) [32ECE75A].mkv");
        assert!(!releases_match(&a, &b, false));
    }

    #[test]
    fn test_repack_must_agree() {
        let plain = parse_release("Show.S02E03.1080p.WEB.h264-GRP");
        let repack = parse_release("Show.S02E03.REPACK.1080p.WEB.h264-GRP");
        assert!(!releases_match(&plain, &repack, false));
        assert!(!releases_match(&repack, &plain, false));
    }
}
