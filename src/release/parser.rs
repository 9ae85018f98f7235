//! Release-name parser for scene-style torrent and file names
//!
//! Parses names like:
//! - "The Green Mile 1999 BluRay 1080p DTS 5.1 x264-VietHD"
//! - "Show.S01E05.1080p.WEB-DL.DDP5.1.H.264-GROUP"
//! - "[SubsPlease] Frieren S02E11 (1080p) [32ECE75A].mkv"
//!
//! Parsing never fails; a name that matches nothing yields a release whose
//! title is the raw input.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ContentKind, ParsedRelease};

/// Pattern for a leading fansub site tag ("[SubsPlease] ...")
static SITE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[([^\]]+)\]\s*").unwrap());

/// Pattern for an embedded CRC32 checksum ("[32ECE75A]")
static CHECKSUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\[(]([0-9A-Fa-f]{8})[\])]").unwrap());

/// Pattern for S01E01 format, with optional second episode (S01E01-E02)
static MULTI_EPISODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(.+?)[\s\-]*[Ss](\d{1,2})[Ee](\d{1,3})(?:[-\s]?[Ee]\d{1,3})?").unwrap()
});

/// Pattern for 1x01 format
static NXNN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(.+?)\s*\b(\d{1,2})x(\d{1,3})\b").unwrap());

/// Pattern for "Season X Episode Y" format
static VERBOSE_SEASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(.+?)\s*Season\s*(\d+).*?Episode\s*(\d+)").unwrap());

/// Pattern for daily shows (2026 01 07); month 01-12, day 01-31
static DAILY_SHOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(.+?)\s*\b(\d{4})[\s.\-]+(0[1-9]|1[0-2])[\s.\-]+(0[1-9]|[12]\d|3[01])(?:\s|$|\.)")
        .unwrap()
});

/// Pattern for season-only S01 format (season packs)
static SEASON_ONLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(.+?)\s*\b[Ss](\d{1,2})\b(?:\s+\d{4}|\s+\d{3,4}p|\s+Complete|\s+Full|\s*$|\s)")
        .unwrap()
});

/// Pattern for title/year extraction on movie-style names
static MOVIE_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.+?)[\s(\[]+((?:19|20)\d{2})(?:[\s)\]]|$)").unwrap());

/// Pattern for standalone year extraction
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

/// Pattern for quality boundary when no year is present
static QUALITY_BOUNDARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(2160p|1080p|720p|480p|4K|UHD|HDR|BluRay|WEB|HDTV|DVDRip|BRRip|REMUX)")
        .unwrap()
});

/// Pattern for release group extraction (after the last dash)
static GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-([A-Za-z0-9]+)(?:\.[A-Za-z0-9]{2,4})?$").unwrap());

/// Pattern for resolution extraction
static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(2160p|1080p|960p|720p|576p|480p|360p|4K|UHD)\b").unwrap());

/// Pattern for audio channel layout (5.1, 7.1, DDP2 0). A letter prefix is
/// fine (DDP5.1); a digit prefix or suffix is not (2026.01).
static CHANNELS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])([2-9])[.\s]([01])(?:[^0-9]|$)").unwrap());

/// Pattern for trailing year cleanup in titles
static TRAILING_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(?(?:19|20)\d{2}\)?\s*$").unwrap());

/// Pattern for trailing bracket/paren groups in titles
static TRAILING_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[(\[][^)\]]*[)\]]\s*$").unwrap());

/// Pattern for multiple spaces cleanup
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Trailing media extensions stripped before title parsing
const MEDIA_EXTENSIONS: &[(&str, ContentKind)] = &[
    (".mkv", ContentKind::Unknown),
    (".mp4", ContentKind::Unknown),
    (".avi", ContentKind::Unknown),
    (".m2ts", ContentKind::Unknown),
    (".ts", ContentKind::Unknown),
    (".wmv", ContentKind::Unknown),
    (".flac", ContentKind::Music),
    (".mp3", ContentKind::Music),
    (".m4a", ContentKind::Music),
    (".ogg", ContentKind::Music),
    (".opus", ContentKind::Music),
    (".wav", ContentKind::Music),
    (".m4b", ContentKind::Audiobook),
    (".epub", ContentKind::Book),
    (".mobi", ContentKind::Book),
    (".azw3", ContentKind::Book),
    (".pdf", ContentKind::Book),
    (".cbz", ContentKind::Comic),
    (".cbr", ContentKind::Comic),
];

/// Groups that are actually quality tokens the trailing-dash regex can grab
const GROUP_IGNORE_LIST: &[&str] = &[
    "mkv", "mp4", "avi", "1080p", "720p", "2160p", "480p", "x264", "x265", "h264", "h265", "hevc",
    "av1", "web", "dl", "bluray", "remux", "repack", "proper",
];

/// Tokens carried in the `other` list (REPACK2 etc. are matched by prefix)
const OTHER_TAGS: &[&str] = &["PROPER", "HYBRID", "INTERNAL", "REMUX", "RERIP", "READNFO"];

/// Tags recognized as collections
const COLLECTION_TAGS: &[&str] = &["IMAX", "CRITERION", "MASTERS OF CINEMA"];

/// Edition phrases (uppercase, matched against the spaced name)
const EDITION_TAGS: &[&str] = &[
    "EXTENDED", "REMASTERED", "UNRATED", "UNCUT", "SPECIAL EDITION", "ULTIMATE EDITION",
    "ANNIVERSARY EDITION", "OPEN MATTE",
];

/// Cut phrases (uppercase, matched against the spaced name)
const CUT_TAGS: &[&str] = &["DIRECTORS CUT", "DIRECTOR'S CUT", "THEATRICAL CUT", "FINAL CUT"];

/// Parse a release or file name into its structured form
pub fn parse_release(name: &str) -> ParsedRelease {
    let mut result = ParsedRelease {
        raw: name.to_string(),
        ..Default::default()
    };

    let mut working = name.trim().to_string();
    let mut kind_hint = ContentKind::Unknown;

    // Trailing media extension informs the kind and is noise for the title
    let lowered = working.to_lowercase();
    for (ext, kind) in MEDIA_EXTENSIONS {
        if lowered.ends_with(ext) {
            working.truncate(working.len() - ext.len());
            kind_hint = *kind;
            break;
        }
    }

    // Fansub site prefix
    if let Some(caps) = SITE_PREFIX_RE.captures(&working) {
        result.site = Some(caps.get(1).unwrap().as_str().to_string());
        working = SITE_PREFIX_RE.replace(&working, "").to_string();
    }

    // Embedded CRC32 checksum
    if let Some(caps) = CHECKSUM_RE.captures(&working) {
        result.sum = Some(caps.get(1).unwrap().as_str().to_uppercase());
        working = CHECKSUM_RE.replace(&working, " ").to_string();
    }

    // Channel layout is read before dots become spaces
    if let Some(caps) = CHANNELS_RE.captures(&working) {
        result.channels = Some(format!(
            "{}.{}",
            caps.get(1).unwrap().as_str(),
            caps.get(2).unwrap().as_str()
        ));
    }

    let cleaned = working.replace(['.', '_'], " ");
    let cleaned = MULTI_SPACE_RE.replace_all(&cleaned, " ").trim().to_string();

    // Episode patterns, most specific first
    if let Some(caps) = MULTI_EPISODE_RE.captures(&cleaned) {
        result.title = clean_title(caps.get(1).unwrap().as_str());
        result.series = parse_positive(caps.get(2).map(|m| m.as_str()));
        result.episode = parse_positive(caps.get(3).map(|m| m.as_str()));
    } else if let Some(caps) = NXNN_RE.captures(&cleaned) {
        result.title = clean_title(caps.get(1).unwrap().as_str());
        result.series = parse_positive(caps.get(2).map(|m| m.as_str()));
        result.episode = parse_positive(caps.get(3).map(|m| m.as_str()));
    } else if let Some(caps) = VERBOSE_SEASON_RE.captures(&cleaned) {
        result.title = clean_title(caps.get(1).unwrap().as_str());
        result.series = parse_positive(caps.get(2).map(|m| m.as_str()));
        result.episode = parse_positive(caps.get(3).map(|m| m.as_str()));
    } else if let Some(caps) = DAILY_SHOW_RE.captures(&cleaned) {
        result.title = clean_title(caps.get(1).unwrap().as_str());
        result.year = parse_positive(caps.get(2).map(|m| m.as_str()));
        result.month = parse_positive(caps.get(3).map(|m| m.as_str()));
        result.day = parse_positive(caps.get(4).map(|m| m.as_str()));
    } else if let Some(caps) = SEASON_ONLY_RE.captures(&cleaned) {
        result.title = clean_title(caps.get(1).unwrap().as_str());
        result.series = parse_positive(caps.get(2).map(|m| m.as_str()));
    } else if let Some(caps) = MOVIE_YEAR_RE.captures(&cleaned) {
        result.title = clean_title(caps.get(1).unwrap().as_str());
        result.year = parse_positive(caps.get(2).map(|m| m.as_str()));
    } else if let Some(mat) = QUALITY_BOUNDARY_RE.find(&cleaned) {
        result.title = clean_title(&cleaned[..mat.start()]);
    } else {
        result.title = clean_title(&cleaned);
    }

    // Standalone year for disambiguation when no pattern supplied one
    if result.year.is_none() {
        if let Some(caps) = YEAR_RE.captures(&cleaned) {
            result.year = parse_positive(caps.get(1).map(|m| m.as_str()));
        }
    }

    parse_quality(&cleaned, &mut result);
    parse_tags(&cleaned, &mut result);

    // Release group after the trailing dash, quality tokens excluded
    if let Some(caps) = GROUP_RE.captures(&working) {
        let candidate = caps.get(1).unwrap().as_str();
        if !GROUP_IGNORE_LIST.contains(&candidate.to_lowercase().as_str()) {
            result.group = Some(candidate.to_string());
        }
    }

    result.kind = infer_kind(&result, kind_hint);

    if result.title.is_empty() {
        result.title = name.trim().to_string();
    }

    result
}

/// Extract resolution, source, codec, audio, and HDR information
fn parse_quality(cleaned: &str, result: &mut ParsedRelease) {
    let upper = cleaned.to_uppercase();

    if let Some(caps) = RESOLUTION_RE.captures(cleaned) {
        let res = caps.get(1).unwrap().as_str().to_uppercase();
        result.resolution = Some(match res.as_str() {
            "4K" | "UHD" => "2160p".to_string(),
            other => other.to_lowercase(),
        });
    }

    // Source
    if upper.contains("BLURAY") || upper.contains("BLU-RAY") || upper.contains("BLU RAY") {
        result.source = Some("BluRay".to_string());
    } else if upper.contains("BDRIP") {
        result.source = Some("BDRip".to_string());
    } else if upper.contains("WEB-DL") || upper.contains("WEB DL") || upper.contains("WEBDL") {
        result.source = Some("WEB-DL".to_string());
    } else if upper.contains("WEBRIP") || upper.contains("WEB RIP") {
        result.source = Some("WEBRip".to_string());
    } else if has_token(&upper, "WEB") {
        result.source = Some("WEB".to_string());
    } else if upper.contains("HDTV") {
        result.source = Some("HDTV".to_string());
    } else if upper.contains("DVDRIP") {
        result.source = Some("DVDRip".to_string());
    } else if upper.contains("BRRIP") {
        result.source = Some("BRRip".to_string());
    }

    // Codec
    if upper.contains("X265") || upper.contains("H265") || upper.contains("H 265") || upper.contains("HEVC") {
        result.codec.push("HEVC".to_string());
    } else if upper.contains("X264") || upper.contains("H264") || upper.contains("H 264") {
        result.codec.push("H.264".to_string());
    } else if has_token(&upper, "AV1") {
        result.codec.push("AV1".to_string());
    } else if upper.contains("XVID") || upper.contains("DIVX") {
        result.codec.push("XviD".to_string());
    } else if upper.contains("MPEG2") || upper.contains("MPEG 2") {
        result.codec.push("MPEG-2".to_string());
    } else if upper.contains("VC1") || upper.contains("VC 1") {
        result.codec.push("VC-1".to_string());
    }

    // Audio; several tags can legitimately co-occur (TrueHD Atmos)
    if upper.contains("ATMOS") {
        result.audio.push("Atmos".to_string());
    }
    if upper.contains("TRUEHD") || upper.contains("TRUE HD") {
        result.audio.push("TrueHD".to_string());
    }
    if upper.contains("DTS-HD") || upper.contains("DTS HD") || upper.contains("DTSHD") {
        result.audio.push("DTS-HD".to_string());
    } else if has_token(&upper, "DTS") {
        result.audio.push("DTS".to_string());
    }
    if upper.contains("DDP") || upper.contains("DD+") || upper.contains("EAC3") || upper.contains("E-AC3") {
        result.audio.push("DD+".to_string());
    } else if upper.contains("AC3") || upper.contains("DD5") || upper.contains("DD2") || has_token(&upper, "DD") {
        result.audio.push("DD".to_string());
    }
    if has_token(&upper, "FLAC") {
        result.audio.push("FLAC".to_string());
    }
    if has_token(&upper, "AAC") {
        result.audio.push("AAC".to_string());
    }
    if has_token(&upper, "MP3") {
        result.audio.push("MP3".to_string());
    }

    // HDR; Dolby Vision and a base HDR layer often co-occur
    if upper.contains("DOLBY VISION") || has_token(&upper, "DV") || has_token(&upper, "DOVI") {
        result.hdr.push("DV".to_string());
    }
    if upper.contains("HDR10+") || upper.contains("HDR10PLUS") {
        result.hdr.push("HDR10+".to_string());
    } else if upper.contains("HDR10") || has_token(&upper, "HDR") {
        result.hdr.push("HDR10".to_string());
    }
    if has_token(&upper, "HLG") {
        result.hdr.push("HLG".to_string());
    }
}

/// Extract collection, edition, cut, and "other" variant tags
fn parse_tags(cleaned: &str, result: &mut ParsedRelease) {
    let upper = cleaned.to_uppercase();

    for tag in COLLECTION_TAGS {
        if phrase_present(&upper, tag) {
            result.collection = Some(title_case_tag(tag));
            break;
        }
    }

    for tag in EDITION_TAGS {
        if phrase_present(&upper, tag) {
            result.edition.push(title_case_tag(tag));
        }
    }

    for tag in CUT_TAGS {
        if phrase_present(&upper, tag) {
            result.cut.push(title_case_tag(tag));
        }
    }

    for token in upper.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        if token == "REPACK" || (token.starts_with("REPACK") && token[6..].parse::<u8>().is_ok()) {
            result.other.push(token.to_string());
        } else if OTHER_TAGS.contains(&token) {
            result.other.push(token.to_string());
        }
    }
    result.other.dedup();
}

/// Decide the broad content kind from what was parsed
fn infer_kind(result: &ParsedRelease, hint: ContentKind) -> ContentKind {
    if result.is_single_episode() {
        return ContentKind::Episode;
    }
    if result.series.is_some() {
        return ContentKind::Series;
    }
    if result.month.is_some() && result.day.is_some() {
        return ContentKind::Episode;
    }
    if hint != ContentKind::Unknown {
        return hint;
    }

    let looks_video = result.resolution.is_some()
        || result
            .source
            .as_deref()
            .is_some_and(|s| s != "WEB");
    let music_audio = result
        .audio
        .iter()
        .any(|a| matches!(a.as_str(), "FLAC" | "MP3" | "AAC"));

    if music_audio && result.codec.is_empty() && result.resolution.is_none() {
        return ContentKind::Music;
    }
    if result.year.is_some() && looks_video {
        return ContentKind::Movie;
    }

    ContentKind::Unknown
}

/// Normalize a title for comparison: lowercase, drop a leading article,
/// collapse everything that is not alphanumeric.
pub fn normalize_title(title: &str) -> String {
    let mut normalized = title.to_lowercase();

    for article in ["the ", "a ", "an "] {
        if normalized.starts_with(article) {
            normalized = normalized[article.len()..].to_string();
            break;
        }
    }

    normalized
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_title(name: &str) -> String {
    let mut cleaned = name.trim().trim_end_matches('-').trim().to_string();
    cleaned = TRAILING_YEAR_RE.replace(&cleaned, "").to_string();
    cleaned = TRAILING_GROUP_RE.replace(&cleaned, "").to_string();
    cleaned = MULTI_SPACE_RE.replace_all(&cleaned, " ").to_string();
    cleaned.trim().to_string()
}

fn parse_positive(s: Option<&str>) -> Option<u32> {
    s.and_then(|v| v.parse::<u32>().ok()).filter(|n| *n > 0)
}

/// Whole-token containment check on an uppercased name
fn has_token(upper: &str, token: &str) -> bool {
    upper
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|t| t == token)
}

/// Multi-word phrase check tolerant of the separators already collapsed
fn phrase_present(upper: &str, phrase: &str) -> bool {
    if phrase.contains(' ') || phrase.contains('\'') {
        upper
            .replace('\'', "")
            .contains(&phrase.replace('\'', ""))
    } else {
        has_token(upper, phrase)
    }
}

fn title_case_tag(tag: &str) -> String {
    match tag {
        "IMAX" => "IMAX".to_string(),
        other => {
            let lower = other.to_lowercase();
            lower
                .split(' ')
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}
