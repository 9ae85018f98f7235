//! Cross-seed engine for managed torrent clients
//!
//! Given a torrent (pushed by a webhook or discovered by scanning a
//! client), the engine locates complete copies of the same content already
//! present on managed clients, attaches the new torrent to those bytes
//! without re-downloading (directly or via hardlinks/reflinks), and can
//! search external indexers for further cross-seed candidates.
//!
//! The crate is a library: no hidden globals, every entry point takes its
//! collaborators explicitly. The usual wiring is a [`db::Database`], one
//! [`client::TorrentClient`] implementation, a shared
//! [`release::ReleaseCache`], and on top of those a
//! [`service::CrossSeedService`], a [`search::SearchOrchestrator`], and
//! [`queue::CompletionQueues`].

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod gazelle;
pub mod indexer;
pub mod layout;
pub mod linker;
pub mod logging;
pub mod matching;
pub mod queue;
pub mod release;
pub mod resolver;
pub mod search;
pub mod service;
pub mod torrents;
pub mod util;

pub use client::{
    AddTorrentOptions, AppPreferences, BulkAction, Category, ContentLayout, FileEntry,
    TorrentClient, TorrentFilter, TorrentProperties, TorrentSnapshot, extract_domain_from_url,
};
pub use config::Config;
pub use db::{AutomationSettings, Database, InstanceRecord, RunStatus};
pub use error::{CrossSeedError, RateLimitWaitError};
pub use executor::{
    CrossSeedExecutor, CrossSeedOptions, CrossSeedRequest, CrossSeedStatus, ExecutorTiming,
    InstanceCrossSeedResult,
};
pub use gazelle::{GazelleClient, GazelleConfig, calculate_hashes_with_sources};
pub use indexer::{
    IndexerCapabilities, IndexerInfo, IndexerProvider, SearchKind, SearchRequest, SearchResult,
    TorznabEndpoint, TorznabProvider,
};
pub use matching::{MatchType, get_match_type, get_match_type_from_title, releases_match};
pub use queue::{AutobrrApplyRequest, CompletionJob, CompletionQueues, autobrr_apply};
pub use release::{ContentKind, ParsedRelease, ReleaseCache, ReleaseKey};
pub use resolver::{Candidate, CandidateResolver, ResolveContext};
pub use search::{SearchFilters, SearchOrchestrator, SearchRunOptions};
pub use service::CrossSeedService;
pub use torrents::{TorrentMetainfo, parse_torrent};
