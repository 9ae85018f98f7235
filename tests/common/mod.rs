//! Shared fixtures for integration tests: an in-memory torrent client and
//! small bencoded torrent builders.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use seedcross::client::{
    AddTorrentOptions, AppPreferences, BulkAction, Category, FileEntry, TorrentClient,
    TorrentFilter, TorrentProperties, TorrentSnapshot,
};
use seedcross::torrents::parse_torrent;

/// Mutable world the mock client serves
#[derive(Default)]
pub struct MockState {
    pub torrents: HashMap<i64, Vec<TorrentSnapshot>>,
    pub files: HashMap<(i64, String), Vec<FileEntry>>,
    pub exported: HashMap<(i64, String), Vec<u8>>,
    /// Every AddTorrent call: (instance, options, v1 hash of the payload)
    pub added: Vec<(i64, AddTorrentOptions, String)>,
    pub renamed_torrents: Vec<(String, String)>,
    pub renamed_files: Vec<(String, String, String)>,
    pub bulk_actions: Vec<(Vec<String>, BulkAction)>,
    /// Newly added torrents appear in listings with this progress
    pub added_progress: f64,
}

/// In-memory torrent client for driving the engine in tests
pub struct MockClient {
    pub state: Mutex<MockState>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                added_progress: 1.0,
                ..Default::default()
            }),
        })
    }

    pub fn add_snapshot(&self, instance_id: i64, snapshot: TorrentSnapshot) {
        self.state
            .lock()
            .torrents
            .entry(instance_id)
            .or_default()
            .push(snapshot);
    }

    pub fn set_files(&self, instance_id: i64, hash: &str, files: Vec<FileEntry>) {
        self.state
            .lock()
            .files
            .insert((instance_id, hash.to_lowercase()), files);
    }

    pub fn set_export(&self, instance_id: i64, hash: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .exported
            .insert((instance_id, hash.to_lowercase()), bytes);
    }

    pub fn added_count(&self) -> usize {
        self.state.lock().added.len()
    }
}

#[async_trait]
impl TorrentClient for MockClient {
    async fn get_torrents(
        &self,
        instance_id: i64,
        filter: TorrentFilter,
    ) -> Result<Vec<TorrentSnapshot>> {
        let state = self.state.lock();
        let all = state.torrents.get(&instance_id).cloned().unwrap_or_default();
        Ok(match filter {
            TorrentFilter::All => all,
            TorrentFilter::Completed => all.into_iter().filter(|t| t.is_complete()).collect(),
            TorrentFilter::Hashes(hashes) => {
                let wanted: Vec<String> = hashes.iter().map(|h| h.to_lowercase()).collect();
                all.into_iter()
                    .filter(|t| {
                        t.all_hashes()
                            .iter()
                            .any(|h| wanted.contains(&h.to_lowercase()))
                    })
                    .collect()
            }
        })
    }

    async fn get_torrent_files(&self, instance_id: i64, hash: &str) -> Result<Vec<FileEntry>> {
        self.state
            .lock()
            .files
            .get(&(instance_id, hash.to_lowercase()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no files recorded for {}", hash))
    }

    async fn get_torrent_files_batch(
        &self,
        instance_id: i64,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<FileEntry>>> {
        let mut map = HashMap::new();
        for hash in hashes {
            if let Ok(files) = self.get_torrent_files(instance_id, hash).await {
                map.insert(hash.clone(), files);
            }
        }
        Ok(map)
    }

    async fn get_torrent_properties(
        &self,
        instance_id: i64,
        hash: &str,
    ) -> Result<TorrentProperties> {
        let state = self.state.lock();
        let snapshot = state
            .torrents
            .get(&instance_id)
            .and_then(|list| {
                list.iter()
                    .find(|t| t.hash.eq_ignore_ascii_case(hash))
            })
            .ok_or_else(|| anyhow::anyhow!("unknown torrent {}", hash))?;
        Ok(TorrentProperties {
            save_path: snapshot.save_path.clone(),
            content_path: snapshot.content_path.clone(),
            auto_managed: snapshot.auto_managed,
        })
    }

    async fn get_app_preferences(&self, _instance_id: i64) -> Result<AppPreferences> {
        Ok(AppPreferences::default())
    }

    async fn export_torrent(&self, instance_id: i64, hash: &str) -> Result<Vec<u8>> {
        self.state
            .lock()
            .exported
            .get(&(instance_id, hash.to_lowercase()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no export recorded for {}", hash))
    }

    async fn add_torrent(
        &self,
        instance_id: i64,
        torrent: &[u8],
        options: &AddTorrentOptions,
    ) -> Result<()> {
        let meta = parse_torrent(torrent)?;
        let mut state = self.state.lock();
        let snapshot = TorrentSnapshot {
            hash: meta.infohash_v1.clone(),
            infohash_v1: Some(meta.infohash_v1.clone()),
            infohash_v2: meta.infohash_v2.clone(),
            name: meta.name.clone(),
            progress: state.added_progress,
            size: meta.total_size,
            category: options.category.clone().unwrap_or_default(),
            tags: options.tags.clone(),
            save_path: options.save_path.clone().unwrap_or_default(),
            ..Default::default()
        };
        state
            .torrents
            .entry(instance_id)
            .or_default()
            .push(snapshot);
        state
            .added
            .push((instance_id, options.clone(), meta.infohash_v1));
        Ok(())
    }

    async fn bulk_action(
        &self,
        _instance_id: i64,
        hashes: &[String],
        action: BulkAction,
    ) -> Result<()> {
        self.state.lock().bulk_actions.push((hashes.to_vec(), action));
        Ok(())
    }

    async fn set_tags(&self, _instance_id: i64, _hashes: &[String], _tags: &[String]) -> Result<()> {
        Ok(())
    }

    async fn get_categories(&self, _instance_id: i64) -> Result<HashMap<String, Category>> {
        Ok(HashMap::new())
    }

    async fn create_category(&self, _instance_id: i64, _name: &str, _save_path: &str) -> Result<()> {
        Ok(())
    }

    async fn rename_torrent(&self, _instance_id: i64, hash: &str, new_name: &str) -> Result<()> {
        self.state
            .lock()
            .renamed_torrents
            .push((hash.to_string(), new_name.to_string()));
        Ok(())
    }

    async fn rename_torrent_file(
        &self,
        _instance_id: i64,
        hash: &str,
        old_path: &str,
        new_path: &str,
    ) -> Result<()> {
        self.state.lock().renamed_files.push((
            hash.to_string(),
            old_path.to_string(),
            new_path.to_string(),
        ));
        Ok(())
    }

    async fn rename_torrent_folder(
        &self,
        _instance_id: i64,
        hash: &str,
        old_folder: &str,
        new_folder: &str,
    ) -> Result<()> {
        self.state.lock().renamed_files.push((
            hash.to_string(),
            old_folder.to_string(),
            new_folder.to_string(),
        ));
        Ok(())
    }

    async fn has_torrent_by_any_hash(
        &self,
        instance_id: i64,
        hashes: &[String],
    ) -> Result<Option<TorrentSnapshot>> {
        let wanted: Vec<String> = hashes.iter().map(|h| h.to_lowercase()).collect();
        let state = self.state.lock();
        Ok(state.torrents.get(&instance_id).and_then(|list| {
            list.iter()
                .find(|t| {
                    t.all_hashes()
                        .iter()
                        .any(|h| wanted.contains(&h.to_lowercase()))
                })
                .cloned()
        }))
    }
}

/// Bencode a minimal multi-file torrent
pub fn multi_file_torrent(name: &str, files: &[(&str, i64)], source: Option<&str>) -> Vec<u8> {
    let mut info = String::new();
    info.push('d');
    info.push_str("5:filesl");
    for (path, size) in files {
        info.push_str(&format!("d6:lengthi{}e4:pathl", size));
        for part in path.split('/') {
            info.push_str(&format!("{}:{}", part.len(), part));
        }
        info.push_str("ee");
    }
    info.push('e');
    info.push_str(&format!("4:name{}:{}", name.len(), name));
    info.push_str("12:piece lengthi16384e6:pieces0:");
    if let Some(src) = source {
        info.push_str(&format!("6:source{}:{}", src.len(), src));
    }
    info.push('e');
    format!("d4:info{}e", info).into_bytes()
}

/// Bencode a minimal single-file torrent
pub fn single_file_torrent(name: &str, size: i64) -> Vec<u8> {
    let info = format!(
        "d6:lengthi{}e4:name{}:{}12:piece lengthi16384e6:pieces0:e",
        size,
        name.len(),
        name
    );
    format!("d4:info{}e", info).into_bytes()
}

/// Snapshot helper for seeding the mock client
pub fn complete_snapshot(hash: &str, name: &str, size: i64, save_path: &str) -> TorrentSnapshot {
    TorrentSnapshot {
        hash: hash.to_string(),
        name: name.to_string(),
        progress: 1.0,
        size,
        save_path: save_path.to_string(),
        content_path: format!("{}/{}", save_path.trim_end_matches('/'), name),
        ..Default::default()
    }
}
