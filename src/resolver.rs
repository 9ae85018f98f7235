//! Candidate resolution
//!
//! For an incoming torrent, enumerate local candidates across managed
//! client instances: cheap release-level filtering first, then file-backed
//! classification. One failing instance never fails the whole call; it is
//! logged and skipped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use anyhow::{Context, Result};

use crate::client::{FileEntry, TorrentClient, TorrentFilter, TorrentSnapshot};
use crate::db::InstanceRecord;
use crate::matching::{MatchType, get_match_type, get_match_type_from_title, releases_match};
use crate::release::{ParsedRelease, ReleaseCache, ReleaseKey};
use crate::util::paths::normalize_hash;

/// Per-call cache of fetched file lists, keyed by normalized hash.
///
/// One higher-level operation (a webhook apply, a search run candidate)
/// shares a stash so the same torrent's files are fetched once.
#[derive(Default)]
pub struct FileStash {
    inner: Mutex<HashMap<String, Arc<Vec<FileEntry>>>>,
}

impl FileStash {
    pub fn get(&self, hash: &str) -> Option<Arc<Vec<FileEntry>>> {
        self.inner.lock().get(&normalize_hash(hash)).cloned()
    }

    pub fn put(&self, hash: &str, files: Arc<Vec<FileEntry>>) {
        self.inner.lock().insert(normalize_hash(hash), files);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// (instance, duplicate hash) → representative hash.
///
/// Duplicate torrents share the representative's stash entry, so the stash
/// stays O(unique content) instead of O(torrents).
#[derive(Default)]
pub struct DedupMap {
    inner: Mutex<HashMap<(i64, String), String>>,
}

impl DedupMap {
    pub fn representative(&self, instance_id: i64, hash: &str) -> Option<String> {
        self.inner
            .lock()
            .get(&(instance_id, normalize_hash(hash)))
            .cloned()
    }

    pub fn record(&self, instance_id: i64, duplicate: &str, representative: &str) {
        self.inner.lock().insert(
            (instance_id, normalize_hash(duplicate)),
            normalize_hash(representative),
        );
    }
}

/// Shared state for one resolution operation
#[derive(Default)]
pub struct ResolveContext {
    pub stash: FileStash,
    pub dedup: DedupMap,
}

impl ResolveContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A torrent on an instance that matched the incoming release
#[derive(Debug, Clone)]
pub struct MatchedTorrent {
    pub torrent: TorrentSnapshot,
    pub match_type: MatchType,
}

/// Per-instance aggregation of matched torrents
#[derive(Debug, Clone)]
pub struct Candidate {
    pub instance_id: i64,
    pub instance_name: String,
    /// The most frequent per-torrent match type, ties broken by first seen
    pub match_type: MatchType,
    pub torrents: Vec<MatchedTorrent>,
}

/// The single best file-verified match on an instance
#[derive(Debug, Clone)]
pub struct BestMatch {
    pub torrent: TorrentSnapshot,
    pub files: Arc<Vec<FileEntry>>,
    pub match_type: MatchType,
}

/// Finds local cross-seed candidates across managed client instances
pub struct CandidateResolver {
    client: Arc<dyn TorrentClient>,
    cache: Arc<ReleaseCache>,
}

impl CandidateResolver {
    pub fn new(client: Arc<dyn TorrentClient>, cache: Arc<ReleaseCache>) -> Self {
        Self { client, cache }
    }

    /// Enumerate candidates for a torrent name across the given instances.
    ///
    /// Instances that error are logged and skipped; the returned list only
    /// contains instances with at least one match.
    pub async fn find_candidates(
        &self,
        torrent_name: &str,
        instances: &[InstanceRecord],
        ignore_patterns: &[String],
        find_individual_episodes: bool,
        ctx: &ResolveContext,
    ) -> Vec<Candidate> {
        let target_rel = self.cache.parse(torrent_name);
        let mut candidates = Vec::new();

        for instance in instances {
            match self
                .find_instance_candidate(
                    torrent_name,
                    &target_rel,
                    instance,
                    ignore_patterns,
                    find_individual_episodes,
                    ctx,
                )
                .await
            {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        instance = %instance.name,
                        error = %e,
                        "Skipping instance during candidate search"
                    );
                }
            }
        }

        candidates
    }

    async fn find_instance_candidate(
        &self,
        torrent_name: &str,
        target_rel: &ParsedRelease,
        instance: &InstanceRecord,
        ignore_patterns: &[String],
        find_individual_episodes: bool,
        ctx: &ResolveContext,
    ) -> Result<Option<Candidate>> {
        let torrents = self
            .client
            .get_torrents(instance.id, TorrentFilter::Completed)
            .await
            .context("Listing completed torrents")?;

        // Cheap release-level filter; anything below full progress is out
        let mut passed: Vec<TorrentSnapshot> = Vec::new();
        for torrent in torrents {
            if !torrent.is_complete() {
                continue;
            }
            let candidate_rel = self.cache.parse(&torrent.name);
            if releases_match(target_rel, &candidate_rel, find_individual_episodes) {
                passed.push(torrent);
            }
        }
        if passed.is_empty() {
            return Ok(None);
        }

        let representatives = self.deduplicate(instance.id, &passed, ctx);

        let mut matched: Vec<MatchedTorrent> = Vec::new();
        for torrent in representatives {
            let files = match self.fetch_files(instance.id, &torrent.hash, ctx).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(
                        instance = %instance.name,
                        hash = %torrent.hash,
                        error = %e,
                        "Could not fetch candidate files"
                    );
                    continue;
                }
            };

            let candidate_rel = self.cache.parse(&torrent.name);
            let match_type = get_match_type_from_title(
                &self.cache,
                torrent_name,
                &torrent.name,
                target_rel,
                &candidate_rel,
                &files,
                ignore_patterns,
            );

            if let Some(match_type) = match_type {
                matched.push(MatchedTorrent { torrent, match_type });
            }
        }

        if matched.is_empty() {
            return Ok(None);
        }

        let match_type = most_frequent_match_type(&matched);
        debug!(
            instance = %instance.name,
            matches = matched.len(),
            match_type = %match_type,
            "Instance candidate resolved"
        );

        Ok(Some(Candidate {
            instance_id: instance.id,
            instance_name: instance.name.clone(),
            match_type,
            torrents: matched,
        }))
    }

    /// Collapse torrents sharing a content identity (same release key and
    /// size) to the oldest one; duplicates are recorded so later file
    /// fetches reuse the representative's entry. A single episode is never
    /// folded into a season pack because their keys differ.
    fn deduplicate(
        &self,
        instance_id: i64,
        torrents: &[TorrentSnapshot],
        ctx: &ResolveContext,
    ) -> Vec<TorrentSnapshot> {
        let mut groups: HashMap<(ReleaseKey, i64), Vec<&TorrentSnapshot>> = HashMap::new();
        let mut keyless: Vec<&TorrentSnapshot> = Vec::new();

        for torrent in torrents {
            let key = self.cache.parse(&torrent.name).release_key();
            if key.is_empty() {
                keyless.push(torrent);
            } else {
                groups.entry((key, torrent.size)).or_default().push(torrent);
            }
        }

        let mut representatives: Vec<TorrentSnapshot> = Vec::new();
        for (_, mut group) in groups {
            group.sort_by_key(|t| t.added_on);
            let representative = group[0];
            for duplicate in &group[1..] {
                ctx.dedup
                    .record(instance_id, &duplicate.hash, &representative.hash);
                debug!(
                    duplicate = %duplicate.hash,
                    representative = %representative.hash,
                    "Deduplicated torrent by content identity"
                );
            }
            representatives.push(representative.clone());
        }
        representatives.extend(keyless.into_iter().cloned());
        representatives.sort_by_key(|t| t.added_on);
        representatives
    }

    /// File list for a torrent, via the per-call stash and dedup aliases
    pub async fn fetch_files(
        &self,
        instance_id: i64,
        hash: &str,
        ctx: &ResolveContext,
    ) -> Result<Arc<Vec<FileEntry>>> {
        let effective = ctx
            .dedup
            .representative(instance_id, hash)
            .unwrap_or_else(|| normalize_hash(hash));

        if let Some(files) = ctx.stash.get(&effective) {
            return Ok(files);
        }

        let files = Arc::new(
            self.client
                .get_torrent_files(instance_id, &effective)
                .await
                .with_context(|| format!("Fetching files for {}", effective))?,
        );
        ctx.stash.put(&effective, files.clone());
        Ok(files)
    }

    /// Among an instance's matched torrents, the one whose file-level match
    /// is strongest. Ties prefer the total size closest to the source, then
    /// the smaller file count.
    pub async fn find_best_candidate_match(
        &self,
        candidate: &Candidate,
        source_rel: &ParsedRelease,
        source_files: &[FileEntry],
        ignore_patterns: &[String],
        ctx: &ResolveContext,
    ) -> Result<Option<BestMatch>> {
        let source_total: i64 = source_files.iter().map(|f| f.size).sum();
        let mut best: Option<BestMatch> = None;

        for matched in &candidate.torrents {
            if !matched.torrent.is_complete() {
                continue;
            }
            let files = match self
                .fetch_files(candidate.instance_id, &matched.torrent.hash, ctx)
                .await
            {
                Ok(files) => files,
                Err(e) => {
                    warn!(
                        hash = %matched.torrent.hash,
                        error = %e,
                        "Could not fetch files for best-match evaluation"
                    );
                    continue;
                }
            };

            let candidate_rel = self.cache.parse(&matched.torrent.name);
            let Some(match_type) = get_match_type(
                &self.cache,
                source_rel,
                &candidate_rel,
                source_files,
                &files,
                ignore_patterns,
            ) else {
                continue;
            };

            let challenger = BestMatch {
                torrent: matched.torrent.clone(),
                files,
                match_type,
            };

            best = Some(match best.take() {
                None => challenger,
                Some(current) => pick_better(current, challenger, source_total),
            });
        }

        Ok(best)
    }
}

fn pick_better(current: BestMatch, challenger: BestMatch, source_total: i64) -> BestMatch {
    if challenger.match_type.rank() != current.match_type.rank() {
        return if challenger.match_type.rank() > current.match_type.rank() {
            challenger
        } else {
            current
        };
    }

    let distance = |m: &BestMatch| {
        let total: i64 = m.files.iter().map(|f| f.size).sum();
        (total - source_total).abs()
    };
    let (current_distance, challenger_distance) = (distance(&current), distance(&challenger));
    if challenger_distance != current_distance {
        return if challenger_distance < current_distance {
            challenger
        } else {
            current
        };
    }

    if challenger.files.len() < current.files.len() {
        challenger
    } else {
        current
    }
}

fn most_frequent_match_type(matched: &[MatchedTorrent]) -> MatchType {
    // Insertion order gives the first-seen tie-break
    let mut counts: Vec<(MatchType, usize)> = Vec::new();
    for m in matched {
        match counts.iter_mut().find(|(t, _)| *t == m.match_type) {
            Some((_, count)) => *count += 1,
            None => counts.push((m.match_type, 1)),
        }
    }
    counts
        .iter()
        .max_by_key(|(_, count)| *count)
        .map(|(t, _)| *t)
        .expect("matched is non-empty")
}
