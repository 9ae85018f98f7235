//! Torrent metainfo decoding
//!
//! Extracts the name, file list, and info-hashes from raw `.torrent` bytes
//! without touching any content. Piece validation is the client's job; the
//! engine only ever compares names, paths, and sizes.

use anyhow::{Context, Result, anyhow};
use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::client::FileEntry;

/// Decoded metainfo surface the engine needs
#[derive(Debug, Clone, Default)]
pub struct TorrentMetainfo {
    pub name: String,
    /// Files with torrent-internal paths; multi-file torrents include the
    /// root folder component
    pub files: Vec<FileEntry>,
    pub total_size: i64,
    /// SHA1 of the bencoded info dict
    pub infohash_v1: String,
    /// SHA256 of the bencoded info dict, for v2 and hybrid torrents
    pub infohash_v2: Option<String>,
    /// The Gazelle-style `source` field, when present
    pub source: Option<String>,
}

impl TorrentMetainfo {
    /// Every hash this torrent is known by
    pub fn all_hashes(&self) -> Vec<String> {
        let mut hashes = vec![self.infohash_v1.clone()];
        if let Some(v2) = &self.infohash_v2 {
            hashes.push(v2.clone());
        }
        hashes
    }
}

/// Parse raw `.torrent` bytes
pub fn parse_torrent(bytes: &[u8]) -> Result<TorrentMetainfo> {
    let root: Value = serde_bencode::from_bytes(bytes).context("Failed to parse torrent file")?;
    let Value::Dict(root_dict) = &root else {
        return Err(anyhow!("Torrent root is not a dictionary"));
    };

    let info = root_dict
        .get(b"info".as_slice())
        .ok_or_else(|| anyhow!("Torrent has no info dictionary"))?;
    let Value::Dict(info_dict) = info else {
        return Err(anyhow!("Torrent info is not a dictionary"));
    };

    let info_bytes = serde_bencode::to_bytes(info).context("Failed to re-encode info dict")?;
    let infohash_v1 = hex_digest::<Sha1>(&info_bytes);

    let meta_version = match info_dict.get(b"meta version".as_slice()) {
        Some(Value::Int(v)) => *v,
        _ => 1,
    };
    let infohash_v2 = (meta_version >= 2).then(|| hex_digest::<Sha256>(&info_bytes));

    let name = match info_dict.get(b"name".as_slice()) {
        Some(Value::Bytes(b)) => String::from_utf8_lossy(b).to_string(),
        _ => String::new(),
    };

    let source = match info_dict.get(b"source".as_slice()) {
        Some(Value::Bytes(b)) => Some(String::from_utf8_lossy(b).to_string()),
        _ => None,
    };

    let mut files = Vec::new();
    match info_dict.get(b"files".as_slice()) {
        Some(Value::List(list)) => {
            for entry in list {
                let Value::Dict(file_dict) = entry else {
                    continue;
                };
                let length = match file_dict.get(b"length".as_slice()) {
                    Some(Value::Int(len)) => *len,
                    _ => continue,
                };
                let mut components = vec![name.clone()];
                if let Some(Value::List(path_parts)) = file_dict.get(b"path".as_slice()) {
                    for part in path_parts {
                        if let Value::Bytes(b) = part {
                            components.push(String::from_utf8_lossy(b).to_string());
                        }
                    }
                }
                files.push(FileEntry {
                    path: components.join("/"),
                    size: length,
                });
            }
        }
        _ => {
            // Single-file torrent
            if let Some(Value::Int(length)) = info_dict.get(b"length".as_slice()) {
                files.push(FileEntry {
                    path: name.clone(),
                    size: *length,
                });
            }
        }
    }

    let total_size = files.iter().map(|f| f.size).sum();

    Ok(TorrentMetainfo {
        name,
        files,
        total_size,
        infohash_v1,
        infohash_v2,
        source,
    })
}

fn hex_digest<D: Digest>(bytes: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{multi_file_torrent, single_file_torrent};

    #[test]
    fn test_parse_multi_file_torrent() {
        let bytes = multi_file_torrent(
            "Show.S01.1080p",
            &[("e01.mkv", 100), ("sub/e02.mkv", 200)],
            None,
        );
        let meta = parse_torrent(&bytes).unwrap();
        assert_eq!(meta.name, "Show.S01.1080p");
        assert_eq!(meta.files.len(), 2);
        assert_eq!(meta.files[0].path, "Show.S01.1080p/e01.mkv");
        assert_eq!(meta.files[1].path, "Show.S01.1080p/sub/e02.mkv");
        assert_eq!(meta.total_size, 300);
        assert_eq!(meta.infohash_v1.len(), 40);
        assert!(meta.infohash_v2.is_none());
    }

    #[test]
    fn test_parse_single_file_torrent() {
        let bytes = single_file_torrent("movie.mkv", 5000);
        let meta = parse_torrent(&bytes).unwrap();
        assert_eq!(meta.name, "movie.mkv");
        assert_eq!(meta.files.len(), 1);
        assert_eq!(meta.files[0].path, "movie.mkv");
        assert_eq!(meta.total_size, 5000);
    }

    #[test]
    fn test_source_field_round_trips() {
        let bytes = multi_file_torrent("Album", &[("01.flac", 10)], Some("RED"));
        let meta = parse_torrent(&bytes).unwrap();
        assert_eq!(meta.source.as_deref(), Some("RED"));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = parse_torrent(&single_file_torrent("x.mkv", 1)).unwrap();
        let b = parse_torrent(&single_file_torrent("x.mkv", 1)).unwrap();
        assert_eq!(a.infohash_v1, b.infohash_v1);

        let c = parse_torrent(&single_file_torrent("y.mkv", 1)).unwrap();
        assert_ne!(a.infohash_v1, c.infohash_v1);
    }

    #[test]
    fn test_garbage_input_is_an_error() {
        assert!(parse_torrent(b"not a torrent").is_err());
    }
}
