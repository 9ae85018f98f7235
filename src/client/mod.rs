//! Torrent-client abstraction
//!
//! The engine never talks wire protocol itself; everything goes through
//! this trait. Implementations wrap a concrete client's HTTP API and are
//! expected to provide per-hash serialization for rename operations.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A file inside a torrent: relative path plus size.
///
/// Paths use forward slashes internally regardless of the client platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: i64,
}

/// Point-in-time view of a torrent on a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentSnapshot {
    pub hash: String,
    pub infohash_v1: Option<String>,
    pub infohash_v2: Option<String>,
    pub name: String,
    /// Completion in [0, 1]
    pub progress: f64,
    pub size: i64,
    pub category: String,
    pub tags: Vec<String>,
    pub save_path: String,
    pub content_path: String,
    pub tracker: String,
    pub auto_managed: bool,
    /// Unix timestamp the torrent was added
    pub added_on: i64,
}

impl TorrentSnapshot {
    /// Every hash form this snapshot is known by
    pub fn all_hashes(&self) -> Vec<String> {
        let mut hashes = vec![self.hash.clone()];
        if let Some(v1) = &self.infohash_v1 {
            if !hashes.contains(v1) {
                hashes.push(v1.clone());
            }
        }
        if let Some(v2) = &self.infohash_v2 {
            if !hashes.contains(v2) {
                hashes.push(v2.clone());
            }
        }
        hashes
    }

    /// Whether the client reports this torrent complete
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Detailed per-torrent properties not carried on the snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentProperties {
    pub save_path: String,
    pub content_path: String,
    pub auto_managed: bool,
}

/// Client-wide preferences the engine cares about
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppPreferences {
    pub content_layout: ContentLayout,
    pub save_path: String,
}

/// How a client lays torrent content on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentLayout {
    #[default]
    Original,
    Subfolder,
    NoSubfolder,
}

impl std::fmt::Display for ContentLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentLayout::Original => write!(f, "Original"),
            ContentLayout::Subfolder => write!(f, "Subfolder"),
            ContentLayout::NoSubfolder => write!(f, "NoSubfolder"),
        }
    }
}

/// Server-side filter for torrent listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentFilter {
    All,
    Completed,
    Hashes(Vec<String>),
}

/// Bulk operations the engine issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Resume,
    Recheck,
    Pause,
}

impl std::fmt::Display for BulkAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkAction::Resume => write!(f, "resume"),
            BulkAction::Recheck => write!(f, "recheck"),
            BulkAction::Pause => write!(f, "pause"),
        }
    }
}

/// Options for adding a torrent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTorrentOptions {
    pub paused: bool,
    pub stopped: bool,
    pub skip_checking: bool,
    pub auto_tmm: bool,
    pub save_path: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub content_layout: Option<ContentLayout>,
    pub use_download_path: Option<bool>,
}

/// A client-side category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub save_path: String,
}

/// Uniform surface over managed torrent clients.
///
/// Every method is a suspension point and must honor caller cancellation
/// promptly; implementations should not retry internally beyond their own
/// transport needs.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    async fn get_torrents(
        &self,
        instance_id: i64,
        filter: TorrentFilter,
    ) -> Result<Vec<TorrentSnapshot>>;

    async fn get_torrent_files(&self, instance_id: i64, hash: &str) -> Result<Vec<FileEntry>>;

    /// Batched form of `get_torrent_files`; absent hashes are simply missing
    /// from the result map
    async fn get_torrent_files_batch(
        &self,
        instance_id: i64,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<FileEntry>>>;

    async fn get_torrent_properties(
        &self,
        instance_id: i64,
        hash: &str,
    ) -> Result<TorrentProperties>;

    async fn get_app_preferences(&self, instance_id: i64) -> Result<AppPreferences>;

    /// Raw `.torrent` bytes for a torrent the client holds
    async fn export_torrent(&self, instance_id: i64, hash: &str) -> Result<Vec<u8>>;

    async fn add_torrent(
        &self,
        instance_id: i64,
        torrent: &[u8],
        options: &AddTorrentOptions,
    ) -> Result<()>;

    async fn bulk_action(
        &self,
        instance_id: i64,
        hashes: &[String],
        action: BulkAction,
    ) -> Result<()>;

    async fn set_tags(&self, instance_id: i64, hashes: &[String], tags: &[String]) -> Result<()>;

    async fn get_categories(&self, instance_id: i64) -> Result<HashMap<String, Category>>;

    async fn create_category(&self, instance_id: i64, name: &str, save_path: &str) -> Result<()>;

    async fn rename_torrent(&self, instance_id: i64, hash: &str, new_name: &str) -> Result<()>;

    async fn rename_torrent_file(
        &self,
        instance_id: i64,
        hash: &str,
        old_path: &str,
        new_path: &str,
    ) -> Result<()>;

    async fn rename_torrent_folder(
        &self,
        instance_id: i64,
        hash: &str,
        old_folder: &str,
        new_folder: &str,
    ) -> Result<()>;

    /// First torrent matching any of the given hashes (v1, v2, or hybrid)
    async fn has_torrent_by_any_hash(
        &self,
        instance_id: i64,
        hashes: &[String],
    ) -> Result<Option<TorrentSnapshot>>;
}

/// Host component of a tracker or announce URL, lowercased
pub fn extract_domain_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain_from_url("https://Tracker.Example.org:2053/announce?passkey=k"),
            Some("tracker.example.org".to_string())
        );
        assert_eq!(
            extract_domain_from_url("udp://tracker.example.org:6969"),
            Some("tracker.example.org".to_string())
        );
        assert_eq!(extract_domain_from_url("not a url"), None);
    }

    #[test]
    fn test_all_hashes_deduplicates() {
        let snapshot = TorrentSnapshot {
            hash: "abc".to_string(),
            infohash_v1: Some("abc".to_string()),
            infohash_v2: Some("def".to_string()),
            ..Default::default()
        };
        assert_eq!(snapshot.all_hashes(), vec!["abc".to_string(), "def".to_string()]);
    }
}
