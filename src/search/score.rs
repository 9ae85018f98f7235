//! Release match scoring for indexer results
//!
//! Search results arrive as bare names; before spending a download on one,
//! score how strongly it resembles the source release. The boolean verdict
//! uses the same compatibility rules as local matching; the score and
//! reasons exist for display and ranking.

use crate::matching::releases_match;
use crate::release::ParsedRelease;

/// Verdict on one indexer result
#[derive(Debug, Clone)]
pub struct ReleaseMatchScore {
    pub matched: bool,
    pub score: u32,
    pub reasons: Vec<String>,
}

/// Score a candidate release name against the source torrent's release
pub fn evaluate_release_match(
    source: &ParsedRelease,
    candidate: &ParsedRelease,
) -> ReleaseMatchScore {
    let matched = releases_match(source, candidate, false);

    let mut score = 0u32;
    let mut reasons = Vec::new();

    if let (Some(s), Some(c)) = (source.group.as_deref(), candidate.group.as_deref()) {
        if s.eq_ignore_ascii_case(c) {
            score += 3;
            reasons.push(format!("release group '{}'", s));
        }
    }

    if let (Some(s), Some(c)) = (source.resolution.as_deref(), candidate.resolution.as_deref()) {
        if s.eq_ignore_ascii_case(c) {
            score += 2;
            reasons.push(format!("resolution {}", s));
        }
    }

    if let (Some(s), Some(c)) = (source.source.as_deref(), candidate.source.as_deref()) {
        if s.eq_ignore_ascii_case(c) {
            score += 2;
            reasons.push(format!("source {}", s));
        }
    }

    if source.series.is_some()
        && source.series == candidate.series
        && source.episode == candidate.episode
    {
        score += 3;
        reasons.push(match (source.series, source.episode) {
            (Some(s), Some(e)) => format!("S{:02}E{:02}", s, e),
            (Some(s), None) => format!("season {}", s),
            _ => "tv structure".to_string(),
        });
    }

    if let (Some(s), Some(c)) = (source.year, candidate.year) {
        if s == c {
            score += 2;
            reasons.push(format!("year {}", s));
        }
    }

    if !source.codec.is_empty() && source.codec == candidate.codec {
        score += 1;
        reasons.push(format!("codec {}", source.codec.join("/")));
    }

    if !source.audio.is_empty() && source.audio == candidate.audio {
        score += 1;
        reasons.push(format!("audio {}", source.audio.join("/")));
    }

    ReleaseMatchScore {
        matched,
        score,
        reasons,
    }
}
