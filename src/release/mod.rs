//! Parsed release model and identity keys
//!
//! A `ParsedRelease` is the structured decomposition of a scene-style
//! release name. It is produced by [`parser`], memoized by [`cache`], and
//! consumed read-only by the matching engine.

pub mod cache;
pub mod parser;

use serde::{Deserialize, Serialize};

pub use cache::{ReleaseCache, TtlCache};
pub use parser::{normalize_title, parse_release};

/// Broad content classification inferred from a release name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Episode,
    Series,
    Music,
    Audiobook,
    Book,
    Comic,
    Game,
    App,
    #[default]
    Unknown,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentKind::Movie => "movie",
            ContentKind::Episode => "episode",
            ContentKind::Series => "series",
            ContentKind::Music => "music",
            ContentKind::Audiobook => "audiobook",
            ContentKind::Book => "book",
            ContentKind::Comic => "comic",
            ContentKind::Game => "game",
            ContentKind::App => "app",
            ContentKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Structured decomposition of a release name.
///
/// Numeric fields are `None` when the name did not carry them; the parser
/// never emits `Some(0)`. Parsing never fails: an unparseable input yields a
/// default release with the raw text as title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRelease {
    pub title: String,
    pub year: Option<u32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub series: Option<u32>,
    pub episode: Option<u32>,
    pub group: Option<String>,
    pub resolution: Option<String>,
    pub source: Option<String>,
    pub codec: Vec<String>,
    pub audio: Vec<String>,
    pub channels: Option<String>,
    pub hdr: Vec<String>,
    pub collection: Option<String>,
    pub edition: Vec<String>,
    pub cut: Vec<String>,
    pub other: Vec<String>,
    /// Fansub site for anime releases (`[SubsPlease] ...`)
    pub site: Option<String>,
    /// CRC32 checksum embedded in the name (`[32ECE75A]`)
    pub sum: Option<String>,
    pub kind: ContentKind,
    /// The unmodified input, kept for display
    pub raw: String,
}

impl ParsedRelease {
    /// Whether either TV marker is present
    pub fn is_tv(&self) -> bool {
        self.series.is_some()
    }

    /// A season pack: season known, no single episode
    pub fn is_season_pack(&self) -> bool {
        self.series.is_some() && self.episode.is_none()
    }

    /// A single episode: both season and episode known
    pub fn is_single_episode(&self) -> bool {
        self.series.is_some() && self.episode.is_some()
    }

    /// Comparable identity tuple for this release
    pub fn release_key(&self) -> ReleaseKey {
        ReleaseKey::derive(self.series, self.episode, self.year, self.month, self.day)
    }
}

/// Comparable identity tuple computed from a parsed release.
///
/// Derivation prefers the most specific structure available: episode within
/// a season, then season, then full date, then year. `Empty` never matches
/// anything, including another `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseKey {
    Episode { series: u32, episode: u32 },
    Season { series: u32 },
    Date { year: u32, month: u32, day: u32 },
    Year { year: u32 },
    Empty,
}

impl ReleaseKey {
    /// Derive the key from the raw numeric fields
    pub fn derive(
        series: Option<u32>,
        episode: Option<u32>,
        year: Option<u32>,
        month: Option<u32>,
        day: Option<u32>,
    ) -> Self {
        let series = series.filter(|s| *s > 0);
        let episode = episode.filter(|e| *e > 0);
        let year = year.filter(|y| *y > 0);

        match (series, episode) {
            (Some(s), Some(e)) => return ReleaseKey::Episode { series: s, episode: e },
            (Some(s), None) => return ReleaseKey::Season { series: s },
            _ => {}
        }

        if let (Some(y), Some(m), Some(d)) = (year, month.filter(|m| *m > 0), day.filter(|d| *d > 0))
        {
            return ReleaseKey::Date { year: y, month: m, day: d };
        }

        if let Some(y) = year {
            return ReleaseKey::Year { year: y };
        }

        ReleaseKey::Empty
    }

    /// Whether this key can never identify anything
    pub fn is_empty(&self) -> bool {
        matches!(self, ReleaseKey::Empty)
    }

    /// Season number when the key carries one
    pub fn series(&self) -> Option<u32> {
        match self {
            ReleaseKey::Episode { series, .. } | ReleaseKey::Season { series } => Some(*series),
            _ => None,
        }
    }
}
