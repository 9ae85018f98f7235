//! Gazelle music-tracker support
//!
//! RED and OPS share the Gazelle metadata layout; the only difference
//! between a RED and an OPS `.torrent` for the same content is the `source`
//! field in the info dict. Rewriting that field and hashing the result
//! predicts the info-hash the other site would assign, which lets the
//! engine skip an indexer probe when the target client already holds it.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use tracing::debug;

/// Source flags the engine knows how to rewrite
pub const GAZELLE_SOURCES: &[&str] = &["RED", "OPS"];

/// Tracker domains attributed to each Gazelle site
const RED_DOMAINS: &[&str] = &["flacsfor.me", "redacted.sh", "redacted.ch"];
const OPS_DOMAINS: &[&str] = &["opsfet.ch", "home.opsfet.ch", "orpheus.network"];

/// Which Gazelle sites to probe given the source torrent's tracker domain.
///
/// A RED torrent probes OPS and vice versa; anything else probes nothing.
pub fn gazelle_targets_for_source(tracker_domain: &str) -> Vec<&'static str> {
    let domain = tracker_domain.trim().to_lowercase();
    if RED_DOMAINS.iter().any(|d| domain.ends_with(d)) {
        return vec!["OPS"];
    }
    if OPS_DOMAINS.iter().any(|d| domain.ends_with(d)) {
        return vec!["RED"];
    }
    Vec::new()
}

/// Rewrite the `source` field for each requested site and return the
/// v1 info-hash each rewrite would produce.
pub fn calculate_hashes_with_sources(
    torrent: &[u8],
    sources: &[&str],
) -> Result<HashMap<String, String>> {
    let root: Value = serde_bencode::from_bytes(torrent).context("Failed to parse torrent file")?;
    let Value::Dict(root_dict) = root else {
        return Err(anyhow!("Torrent root is not a dictionary"));
    };

    let info = root_dict
        .get(b"info".as_slice())
        .ok_or_else(|| anyhow!("Torrent has no info dictionary"))?;
    let Value::Dict(info_dict) = info else {
        return Err(anyhow!("Torrent info is not a dictionary"));
    };

    let mut hashes = HashMap::new();
    for source in sources {
        let mut rewritten = info_dict.clone();
        rewritten.insert(b"source".to_vec(), Value::Bytes(source.as_bytes().to_vec()));
        let encoded = serde_bencode::to_bytes(&Value::Dict(rewritten))
            .context("Failed to re-encode info dict")?;

        let mut hasher = Sha1::new();
        hasher.update(&encoded);
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        hashes.insert(source.to_string(), hash);
    }

    Ok(hashes)
}

/// Per-site configuration
#[derive(Debug, Clone, Default)]
pub struct GazelleConfig {
    pub red_api_key: Option<String>,
    pub ops_api_key: Option<String>,
    pub red_host: Option<String>,
    pub ops_host: Option<String>,
}

impl GazelleConfig {
    /// Whether at least one site is usable
    pub fn any_configured(&self) -> bool {
        self.red_api_key.as_deref().is_some_and(|k| !k.is_empty())
            || self.ops_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn site(&self, source: &str) -> Option<(String, String)> {
        match source {
            "RED" => Some((
                self.red_host
                    .clone()
                    .unwrap_or_else(|| "https://redacted.sh".to_string()),
                self.red_api_key.clone()?,
            )),
            "OPS" => Some((
                self.ops_host
                    .clone()
                    .unwrap_or_else(|| "https://orpheus.network".to_string()),
                self.ops_api_key.clone()?,
            )),
            _ => None,
        }
    }
}

/// A torrent found on a Gazelle site
#[derive(Debug, Clone, Deserialize)]
pub struct GazelleTorrent {
    pub id: i64,
    #[serde(rename = "infoHash", default)]
    pub info_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GazelleResponse<T> {
    status: String,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TorrentEnvelope {
    torrent: GazelleTorrent,
}

/// Thin client for the two Gazelle sites' JSON API
pub struct GazelleClient {
    config: GazelleConfig,
    http: reqwest::Client,
}

impl GazelleClient {
    pub fn new(config: GazelleConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GazelleConfig {
        &self.config
    }

    /// Look a torrent up by info-hash on the given site
    pub async fn find_torrent_by_hash(
        &self,
        source: &str,
        hash: &str,
    ) -> Result<Option<GazelleTorrent>> {
        let (host, api_key) = self
            .config
            .site(source)
            .ok_or_else(|| anyhow!("Gazelle site '{}' is not configured", source))?;

        let url = format!(
            "{}/ajax.php?action=torrent&hash={}",
            host.trim_end_matches('/'),
            hash.to_uppercase()
        );
        debug!(source, hash, "Gazelle hash lookup");

        let response = self
            .http
            .get(&url)
            .header("Authorization", api_key)
            .send()
            .await
            .with_context(|| format!("Gazelle request to {} failed", source))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Gazelle site {} answered {}", source, status);
        }

        let body: GazelleResponse<TorrentEnvelope> =
            response.json().await.context("Parsing Gazelle response")?;
        if body.status != "success" {
            return Ok(None);
        }
        Ok(body.response.map(|env| env.torrent))
    }

    /// Download a `.torrent` by site id
    pub async fn download_torrent(&self, source: &str, torrent_id: i64) -> Result<Vec<u8>> {
        let (host, api_key) = self
            .config
            .site(source)
            .ok_or_else(|| anyhow!("Gazelle site '{}' is not configured", source))?;

        let url = format!(
            "{}/ajax.php?action=download&id={}",
            host.trim_end_matches('/'),
            torrent_id
        );

        let response = self
            .http
            .get(&url)
            .header("Authorization", api_key)
            .send()
            .await
            .with_context(|| format!("Gazelle download from {} failed", source))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Gazelle site {} answered {}", source, status);
        }

        let bytes = response.bytes().await.context("Reading torrent body")?;
        if !bytes.starts_with(b"d") {
            anyhow::bail!("Gazelle site {} returned something that is not a torrent", source);
        }
        Ok(bytes.to_vec())
    }
}
