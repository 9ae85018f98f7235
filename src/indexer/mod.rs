//! Indexer abstraction
//!
//! Only the minimum query/download surface the engine needs: search, fetch
//! a `.torrent`, and capability introspection. Concrete backends live in
//! [`torznab`].

pub mod torznab;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::error::RateLimitWaitError;
pub use torznab::{TorznabEndpoint, TorznabProvider};

/// Broad search mode, mapped to the Torznab query types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Generic,
    Tv,
    Movie,
    Music,
    Book,
}

impl std::fmt::Display for SearchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchKind::Generic => write!(f, "search"),
            SearchKind::Tv => write!(f, "tvsearch"),
            SearchKind::Movie => write!(f, "movie"),
            SearchKind::Music => write!(f, "music"),
            SearchKind::Book => write!(f, "book"),
        }
    }
}

/// A search request fanned out to one or more indexers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub kind: SearchKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub year: Option<u32>,
    pub limit: Option<u32>,
    /// Restrict to these indexer ids; empty means all enabled
    pub indexer_ids: Vec<i64>,
}

/// One result row from an indexer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub indexer_id: i64,
    pub indexer_name: String,
    pub title: String,
    pub download_url: String,
    pub info_url: Option<String>,
    pub size: i64,
    pub seeders: i32,
    pub leechers: i32,
    pub category_id: i32,
    pub category_name: String,
    pub published: Option<DateTime<Utc>>,
    pub download_factor: f64,
    pub upload_factor: f64,
    pub guid: String,
    pub info_hash: Option<String>,
}

/// What an indexer can answer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerCapabilities {
    pub search: bool,
    pub tv_search: bool,
    pub movie_search: bool,
    pub music_search: bool,
    pub book_search: bool,
    /// Torznab category ids the indexer carries
    pub categories: Vec<i32>,
}

impl IndexerCapabilities {
    /// Whether this indexer can serve a search of the given kind
    pub fn supports(&self, kind: SearchKind) -> bool {
        match kind {
            SearchKind::Generic => self.search,
            SearchKind::Tv => self.tv_search,
            SearchKind::Movie => self.movie_search,
            SearchKind::Music => self.music_search,
            SearchKind::Book => self.book_search,
        }
    }
}

/// Identity row for an enabled indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerInfo {
    pub id: i64,
    pub name: String,
}

/// Uniform surface over the configured search backends.
///
/// A provider owns per-indexer rate limiting; callers see rate pressure
/// only as [`RateLimitWaitError`] inside the error chain.
#[async_trait]
pub trait IndexerProvider: Send + Sync {
    /// Search the indexers named by the request (all enabled when the
    /// request names none). Per-indexer failures surface as errors from
    /// this call only when every indexer failed.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>>;

    /// Fetch the `.torrent` behind a result's download URL
    async fn download_torrent(&self, indexer_id: i64, download_url: &str) -> Result<Vec<u8>>;

    /// Display name for an indexer id
    fn indexer_name(&self, indexer_id: i64) -> Option<String>;

    /// All enabled indexers
    fn list_enabled(&self) -> Vec<IndexerInfo>;

    /// Capabilities for an indexer id
    fn capabilities(&self, indexer_id: i64) -> Option<IndexerCapabilities>;
}
