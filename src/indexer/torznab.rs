//! Minimal Torznab client
//!
//! Implements just enough of the Torznab API to query configured indexers
//! and fetch `.torrent` files. Responses are RSS 2.0 with `torznab:attr`
//! extensions.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::RateLimitWaitError;

use super::{
    IndexerCapabilities, IndexerInfo, IndexerProvider, SearchKind, SearchRequest, SearchResult,
};

/// Default per-indexer request budget
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 30;
/// Wait reported when an indexer answers 429 without a Retry-After header
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);
/// Upper bound on any single rate-limit wait
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(10 * 60);

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One configured Torznab endpoint
#[derive(Debug, Clone)]
pub struct TorznabEndpoint {
    pub id: i64,
    pub name: String,
    /// API base, e.g. `https://indexer.example/api`
    pub api_url: String,
    pub api_key: String,
    pub capabilities: IndexerCapabilities,
    /// Queries allowed per minute; `None` uses the default budget
    pub requests_per_minute: Option<u32>,
}

struct EndpointState {
    endpoint: TorznabEndpoint,
    limiter: DirectLimiter,
}

/// Torznab-backed implementation of [`IndexerProvider`]
pub struct TorznabProvider {
    client: Client,
    endpoints: HashMap<i64, Arc<EndpointState>>,
}

impl TorznabProvider {
    pub fn new(endpoints: Vec<TorznabEndpoint>) -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoints = endpoints
            .into_iter()
            .map(|endpoint| {
                let per_minute = endpoint
                    .requests_per_minute
                    .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE);
                let quota =
                    Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
                let state = Arc::new(EndpointState {
                    limiter: RateLimiter::direct(quota),
                    endpoint,
                });
                (state.endpoint.id, state)
            })
            .collect();

        Ok(Self { client, endpoints })
    }

    fn endpoint(&self, indexer_id: i64) -> Result<&Arc<EndpointState>> {
        self.endpoints
            .get(&indexer_id)
            .ok_or_else(|| anyhow!("Unknown indexer id {}", indexer_id))
    }

    /// Consume a rate-limit permit or raise the distinguished wait error
    fn acquire_permit(state: &EndpointState) -> Result<()> {
        if let Err(not_until) = state.limiter.check() {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            return Err(RateLimitWaitError {
                indexer_id: state.endpoint.id,
                indexer_name: state.endpoint.name.clone(),
                wait,
                max_wait: MAX_RATE_LIMIT_WAIT,
                priority: 0,
            }
            .into());
        }
        Ok(())
    }

    async fn search_endpoint(
        &self,
        state: &EndpointState,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>> {
        Self::acquire_permit(state)?;

        let url = build_api_url(&state.endpoint, request);
        debug!(indexer = %state.endpoint.name, url = %url, "Torznab search");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Torznab request to '{}' failed", state.endpoint.name))?;

        if response.status().as_u16() == 429 {
            let wait = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
            return Err(RateLimitWaitError {
                indexer_id: state.endpoint.id,
                indexer_name: state.endpoint.name.clone(),
                wait,
                max_wait: MAX_RATE_LIMIT_WAIT,
                priority: 0,
            }
            .into());
        }

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "Torznab indexer '{}' answered {}",
                state.endpoint.name,
                status
            );
        }

        let body = response.text().await.context("Reading Torznab response")?;
        parse_response(&body, state.endpoint.id, &state.endpoint.name)
    }
}

#[async_trait]
impl IndexerProvider for TorznabProvider {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let chosen: Vec<&Arc<EndpointState>> = if request.indexer_ids.is_empty() {
            self.endpoints.values().collect()
        } else {
            request
                .indexer_ids
                .iter()
                .filter_map(|id| self.endpoints.get(id))
                .collect()
        };
        if chosen.is_empty() {
            anyhow::bail!("No Torznab indexers selected");
        }

        let mut results = Vec::new();
        let mut last_error: Option<anyhow::Error> = None;
        let mut failures = 0usize;

        for state in &chosen {
            match self.search_endpoint(state, request).await {
                Ok(mut rows) => results.append(&mut rows),
                Err(e) => {
                    // Rate-limit waits must reach the orchestrator intact
                    if RateLimitWaitError::find_in(&e).is_some() {
                        return Err(e);
                    }
                    warn!(indexer = %state.endpoint.name, error = %e, "Indexer search failed");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == chosen.len() {
            return Err(last_error.unwrap_or_else(|| anyhow!("All indexer searches failed")));
        }

        // Deterministic order for persistence: seeders desc, then title
        results.sort_by(|a, b| b.seeders.cmp(&a.seeders).then(a.title.cmp(&b.title)));
        Ok(results)
    }

    async fn download_torrent(&self, indexer_id: i64, download_url: &str) -> Result<Vec<u8>> {
        let state = self.endpoint(indexer_id)?;
        Self::acquire_permit(state)?;

        let response = self
            .client
            .get(download_url)
            .send()
            .await
            .with_context(|| format!("Download from '{}' failed", state.endpoint.name))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "Torrent download from '{}' answered {}",
                state.endpoint.name,
                status
            );
        }

        let bytes = response.bytes().await.context("Reading torrent body")?;
        if !bytes.starts_with(b"d") {
            anyhow::bail!(
                "Indexer '{}' returned something that is not a torrent file",
                state.endpoint.name
            );
        }
        Ok(bytes.to_vec())
    }

    fn indexer_name(&self, indexer_id: i64) -> Option<String> {
        self.endpoints
            .get(&indexer_id)
            .map(|s| s.endpoint.name.clone())
    }

    fn list_enabled(&self) -> Vec<IndexerInfo> {
        let mut infos: Vec<IndexerInfo> = self
            .endpoints
            .values()
            .map(|s| IndexerInfo {
                id: s.endpoint.id,
                name: s.endpoint.name.clone(),
            })
            .collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    fn capabilities(&self, indexer_id: i64) -> Option<IndexerCapabilities> {
        self.endpoints
            .get(&indexer_id)
            .map(|s| s.endpoint.capabilities.clone())
    }
}

/// Build the API URL for a search request
fn build_api_url(endpoint: &TorznabEndpoint, request: &SearchRequest) -> String {
    let mut params: Vec<(&str, String)> = vec![
        ("t", query_type(request.kind).to_string()),
        ("apikey", endpoint.api_key.clone()),
    ];
    if !request.query.is_empty() {
        params.push(("q", request.query.clone()));
    }
    if let Some(season) = request.season {
        params.push(("season", season.to_string()));
    }
    if let Some(episode) = request.episode {
        params.push(("ep", episode.to_string()));
    }
    if let Some(year) = request.year {
        params.push(("year", year.to_string()));
    }
    if let Some(limit) = request.limit {
        params.push(("limit", limit.to_string()));
    }

    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    format!(
        "{}?{}",
        endpoint.api_url.trim_end_matches('/'),
        query.join("&")
    )
}

fn query_type(kind: SearchKind) -> &'static str {
    match kind {
        SearchKind::Generic => "search",
        SearchKind::Tv => "tvsearch",
        SearchKind::Movie => "movie",
        SearchKind::Music => "music",
        SearchKind::Book => "book",
    }
}

/// Parse a Torznab RSS response into result rows
fn parse_response(xml: &str, indexer_id: i64, indexer_name: &str) -> Result<Vec<SearchResult>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut results = Vec::new();
    let mut current: Option<ResultBuilder> = None;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "item" {
                    current = Some(ResultBuilder::default());
                }
                current_tag = Some(name);
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if let Some(builder) = current.as_mut() {
                    if name == "torznab:attr" || name == "newznab:attr" {
                        let mut attr_name = None;
                        let mut attr_value = None;
                        for attr in e.attributes().flatten() {
                            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            match key.as_str() {
                                "name" => attr_name = Some(value),
                                "value" => attr_value = Some(value),
                                _ => {}
                            }
                        }
                        if let (Some(n), Some(v)) = (attr_name, attr_value) {
                            builder.set_attr(&n, &v);
                        }
                    } else if name == "enclosure" {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"url" {
                                builder.download_url =
                                    Some(String::from_utf8_lossy(&attr.value).to_string());
                            }
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(builder), Some(tag)) = (current.as_mut(), current_tag.as_deref()) {
                    let text = t.unescape().unwrap_or_default().to_string();
                    builder.set_field(tag, &text);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "item" {
                    if let Some(builder) = current.take() {
                        if let Some(result) = builder.build(indexer_id, indexer_name) {
                            results.push(result);
                        }
                    }
                }
                current_tag = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("Malformed Torznab XML: {}", e)),
            _ => {}
        }
    }

    Ok(results)
}

#[derive(Default)]
struct ResultBuilder {
    title: Option<String>,
    guid: Option<String>,
    download_url: Option<String>,
    info_url: Option<String>,
    size: Option<i64>,
    seeders: Option<i32>,
    leechers: Option<i32>,
    category_id: Option<i32>,
    category_name: Option<String>,
    published: Option<DateTime<Utc>>,
    download_factor: Option<f64>,
    upload_factor: Option<f64>,
    info_hash: Option<String>,
}

impl ResultBuilder {
    fn set_field(&mut self, tag: &str, value: &str) {
        match tag {
            "title" => self.title = Some(value.to_string()),
            "guid" => self.guid = Some(value.to_string()),
            "link" => {
                if self.download_url.is_none() {
                    self.download_url = Some(value.to_string());
                }
            }
            "comments" => self.info_url = Some(value.to_string()),
            "size" => self.size = value.parse().ok(),
            "category" => {
                if let Ok(id) = value.parse() {
                    self.category_id = Some(id);
                } else {
                    self.category_name = Some(value.to_string());
                }
            }
            "pubDate" => {
                self.published = DateTime::parse_from_rfc2822(value)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc));
            }
            _ => {}
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        match name {
            "size" => self.size = value.parse().ok(),
            "seeders" => self.seeders = value.parse().ok(),
            "peers" | "leechers" => self.leechers = value.parse().ok(),
            "category" => {
                if self.category_id.is_none() {
                    self.category_id = value.parse().ok();
                }
            }
            "infohash" => self.info_hash = Some(value.to_lowercase()),
            "downloadvolumefactor" => self.download_factor = value.parse().ok(),
            "uploadvolumefactor" => self.upload_factor = value.parse().ok(),
            _ => {}
        }
    }

    fn build(self, indexer_id: i64, indexer_name: &str) -> Option<SearchResult> {
        let title = self.title?;
        let download_url = self.download_url?;
        Some(SearchResult {
            indexer_id,
            indexer_name: indexer_name.to_string(),
            guid: self.guid.unwrap_or_else(|| download_url.clone()),
            title,
            download_url,
            info_url: self.info_url,
            size: self.size.unwrap_or(0),
            seeders: self.seeders.unwrap_or(0),
            leechers: self.leechers.unwrap_or(0),
            category_id: self.category_id.unwrap_or(0),
            category_name: self.category_name.unwrap_or_default(),
            published: self.published,
            download_factor: self.download_factor.unwrap_or(1.0),
            upload_factor: self.upload_factor.unwrap_or(1.0),
            info_hash: self.info_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed">
  <channel>
    <title>Indexer</title>
    <item>
      <title>Show.S01E05.1080p.WEB-DL.x264-GRP</title>
      <guid>https://indexer.example/details/42</guid>
      <link>https://indexer.example/dl/42.torrent</link>
      <pubDate>Sat, 01 Aug 2026 10:00:00 +0000</pubDate>
      <size>1234567</size>
      <torznab:attr name="seeders" value="12"/>
      <torznab:attr name="peers" value="3"/>
      <torznab:attr name="category" value="5040"/>
      <torznab:attr name="infohash" value="ABCDEF0123456789ABCDEF0123456789ABCDEF01"/>
      <torznab:attr name="downloadvolumefactor" value="0"/>
      <torznab:attr name="uploadvolumefactor" value="1"/>
    </item>
    <item>
      <title>Broken entry without link</title>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_response_extracts_attrs() {
        let results = parse_response(SAMPLE_RSS, 7, "Indexer").unwrap();
        assert_eq!(results.len(), 1);

        let result = &results[0];
        assert_eq!(result.indexer_id, 7);
        assert_eq!(result.title, "Show.S01E05.1080p.WEB-DL.x264-GRP");
        assert_eq!(result.download_url, "https://indexer.example/dl/42.torrent");
        assert_eq!(result.size, 1234567);
        assert_eq!(result.seeders, 12);
        assert_eq!(result.leechers, 3);
        assert_eq!(result.category_id, 5040);
        assert_eq!(
            result.info_hash.as_deref(),
            Some("abcdef0123456789abcdef0123456789abcdef01")
        );
        assert_eq!(result.download_factor, 0.0);
        assert!(result.published.is_some());
    }

    #[test]
    fn test_build_api_url_encodes_query() {
        let endpoint = TorznabEndpoint {
            id: 1,
            name: "idx".to_string(),
            api_url: "https://indexer.example/api/".to_string(),
            api_key: "key".to_string(),
            capabilities: IndexerCapabilities::default(),
            requests_per_minute: None,
        };
        let request = SearchRequest {
            query: "Show S01".to_string(),
            kind: SearchKind::Tv,
            season: Some(1),
            limit: Some(50),
            ..Default::default()
        };

        let url = build_api_url(&endpoint, &request);
        assert!(url.starts_with("https://indexer.example/api?t=tvsearch&apikey=key"));
        assert!(url.contains("q=Show%20S01"));
        assert!(url.contains("season=1"));
        assert!(url.contains("limit=50"));
    }

    #[test]
    fn test_rate_limiter_raises_wait_error_when_exhausted() {
        let endpoint = TorznabEndpoint {
            id: 9,
            name: "strict".to_string(),
            api_url: "https://indexer.example/api".to_string(),
            api_key: "key".to_string(),
            capabilities: IndexerCapabilities::default(),
            requests_per_minute: Some(1),
        };
        let provider = TorznabProvider::new(vec![endpoint]).unwrap();
        let state = provider.endpoint(9).unwrap();

        // First permit passes, second within the same minute does not
        TorznabProvider::acquire_permit(state).unwrap();
        let err = TorznabProvider::acquire_permit(state).unwrap_err();
        let wait = RateLimitWaitError::find_in(&err).expect("rate-limit error kind");
        assert_eq!(wait.indexer_id, 9);
        assert!(wait.wait <= MAX_RATE_LIMIT_WAIT);
    }
}
