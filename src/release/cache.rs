//! Memoizing release cache
//!
//! Release parsing is regex-heavy and the same names come back over and over
//! within one scan, so parses are memoized with a short TTL. The normalizer
//! layers (lower-trim, upper-trim, path-for-comparison, domain-name) each
//! keep their own cache so a hot path never recomputes a cheap-but-frequent
//! transform either.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::{ParsedRelease, parser};
use crate::util::paths::normalize_path;

/// Default TTL for cached parses
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A cached entry with expiration time
#[derive(Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// Simple TTL-based cache keyed by string
pub struct TtlCache<T: Clone + Send + Sync> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    default_ttl: Duration,
}

impl<T: Clone + Send + Sync> TtlCache<T> {
    /// Create a new cache with the specified default TTL
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Get a cached value if it exists and hasn't expired
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read();
        entries.get(key).and_then(|entry| {
            if Instant::now() < entry.expires_at {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Set a cached value with the default TTL
    pub fn set(&self, key: String, value: T) {
        let mut entries = self.entries.write();
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.default_ttl,
            },
        );
    }

    /// Remove all expired entries
    pub fn cleanup_expired(&self) {
        let mut entries = self.entries.write();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Number of live entries (expired entries may still be counted until
    /// the next cleanup)
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Memoizing front-end over the release parser.
///
/// Reads take a shared lock, so unrelated parses never serialize on each
/// other; only the insert after a miss takes the write lock briefly.
pub struct ReleaseCache {
    parses: TtlCache<Arc<ParsedRelease>>,
    lower_trim: TtlCache<String>,
    upper_trim: TtlCache<String>,
    comparison_paths: TtlCache<String>,
    domains: TtlCache<String>,
}

impl Default for ReleaseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ReleaseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            parses: TtlCache::new(ttl),
            lower_trim: TtlCache::new(ttl),
            upper_trim: TtlCache::new(ttl),
            comparison_paths: TtlCache::new(ttl),
            domains: TtlCache::new(ttl),
        }
    }

    /// Parse a release name, memoized. Never fails; unparseable input yields
    /// a release whose title is the raw text.
    pub fn parse(&self, name: &str) -> Arc<ParsedRelease> {
        if let Some(hit) = self.parses.get(name) {
            return hit;
        }
        let parsed = Arc::new(parser::parse_release(name));
        self.parses.set(name.to_string(), parsed.clone());
        parsed
    }

    /// Lowercased, trimmed form of a string
    pub fn lower_trim(&self, s: &str) -> String {
        if let Some(hit) = self.lower_trim.get(s) {
            return hit;
        }
        let value = s.trim().to_lowercase();
        self.lower_trim.set(s.to_string(), value.clone());
        value
    }

    /// Uppercased, trimmed form of a string
    pub fn upper_trim(&self, s: &str) -> String {
        if let Some(hit) = self.upper_trim.get(s) {
            return hit;
        }
        let value = s.trim().to_uppercase();
        self.upper_trim.set(s.to_string(), value.clone());
        value
    }

    /// Forward-slash, lowercased path form used for comparisons
    pub fn path_for_comparison(&self, path: &str) -> String {
        if let Some(hit) = self.comparison_paths.get(path) {
            return hit;
        }
        let value = normalize_path(path).to_lowercase();
        self.comparison_paths.set(path.to_string(), value.clone());
        value
    }

    /// Registrable host of a tracker URL, lowercased; the input itself when
    /// it does not parse as a URL
    pub fn domain_name(&self, url: &str) -> String {
        if let Some(hit) = self.domains.get(url) {
            return hit;
        }
        let value = crate::client::extract_domain_from_url(url)
            .unwrap_or_else(|| url.trim().to_lowercase());
        self.domains.set(url.to_string(), value.clone());
        value
    }

    /// Drop expired entries from every layer
    pub fn cleanup_expired(&self) {
        self.parses.cleanup_expired();
        self.lower_trim.cleanup_expired();
        self.upper_trim.cleanup_expired();
        self.comparison_paths.cleanup_expired();
        self.domains.cleanup_expired();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_cache_set_and_get() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("key".to_string(), "value".to_string());
        assert_eq!(cache.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_cache_expiration() {
        let cache = TtlCache::new(Duration::from_millis(50));
        cache.set("key".to_string(), "value".to_string());
        assert_eq!(cache.get("key"), Some("value".to_string()));

        sleep(Duration::from_millis(60));
        assert_eq!(cache.get("key"), None);
    }

    #[test]
    fn test_parse_is_stable_within_ttl() {
        let cache = ReleaseCache::default();
        let first = cache.parse("Show.S01E05.1080p.WEB-DL.x264-GRP");
        let second = cache.parse("Show.S01E05.1080p.WEB-DL.x264-GRP");
        assert_eq!(*first, *second);
        assert_eq!(first.release_key(), second.release_key());
    }

    #[test]
    fn test_normalizer_layers() {
        let cache = ReleaseCache::default();
        assert_eq!(cache.lower_trim("  MiXeD  "), "mixed");
        assert_eq!(cache.upper_trim("  mixed "), "MIXED");
        assert_eq!(cache.path_for_comparison("A\\B\\C.mkv"), "a/b/c.mkv");
        assert_eq!(
            cache.domain_name("https://tracker.example.org/announce?passkey=x"),
            "tracker.example.org"
        );
    }
}
