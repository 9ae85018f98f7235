//! Persistence layer
//!
//! SQLite-backed stores behind narrow repositories. The engine owns its own
//! schema; `Database::connect` creates anything missing.

pub mod completion_settings;
pub mod feed_items;
pub mod instances;
pub mod rate_limits;
pub mod search_history;
pub mod search_runs;
pub mod settings;
pub mod tracker_customizations;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use completion_settings::{CompletionSettings, CompletionSettingsRepository};
pub use feed_items::{FeedItemRecord, FeedItemRepository, FeedItemStatus};
pub use instances::{CreateInstance, InstanceRecord, InstanceRepository};
pub use rate_limits::RateLimitRepository;
pub use search_history::SearchHistoryRepository;
pub use search_runs::{
    RunStatus, RunTotals, SearchRunRecord, SearchRunRepository, SearchRunResult,
};
pub use settings::{AutomationSettings, SettingsRepository};
pub use tracker_customizations::{TrackerCustomization, TrackerCustomizationRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the engine database at the given path
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to open engine database")?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// In-memory database for tests
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }

    pub fn instances(&self) -> InstanceRepository {
        InstanceRepository::new(self.pool.clone())
    }

    pub fn search_runs(&self) -> SearchRunRepository {
        SearchRunRepository::new(self.pool.clone())
    }

    pub fn search_history(&self) -> SearchHistoryRepository {
        SearchHistoryRepository::new(self.pool.clone())
    }

    pub fn feed_items(&self) -> FeedItemRepository {
        FeedItemRepository::new(self.pool.clone())
    }

    pub fn rate_limits(&self) -> RateLimitRepository {
        RateLimitRepository::new(self.pool.clone())
    }

    pub fn completion_settings(&self) -> CompletionSettingsRepository {
        CompletionSettingsRepository::new(self.pool.clone())
    }

    pub fn tracker_customizations(&self) -> TrackerCustomizationRepository {
        TrackerCustomizationRepository::new(self.pool.clone())
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cross_seed_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    interval_hours INTEGER NOT NULL DEFAULT 24,
    cooldown_minutes INTEGER NOT NULL DEFAULT 1440,
    max_results_per_indexer INTEGER NOT NULL DEFAULT 50,
    size_tolerance_percent REAL NOT NULL DEFAULT 2.0,
    ignore_patterns TEXT NOT NULL DEFAULT '[]',
    find_individual_episodes INTEGER NOT NULL DEFAULT 0,
    add_cross_seed_tag INTEGER NOT NULL DEFAULT 1,
    start_paused INTEGER NOT NULL DEFAULT 0,
    skip_if_exists INTEGER NOT NULL DEFAULT 1,
    disable_torznab INTEGER NOT NULL DEFAULT 0,
    gazelle_enabled INTEGER NOT NULL DEFAULT 0,
    red_api_key TEXT,
    ops_api_key TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    enabled INTEGER NOT NULL DEFAULT 1,
    has_local_filesystem_access INTEGER NOT NULL DEFAULT 0,
    use_hardlinks INTEGER NOT NULL DEFAULT 0,
    use_reflinks INTEGER NOT NULL DEFAULT 0,
    fallback_to_regular_mode INTEGER NOT NULL DEFAULT 0,
    hardlink_base_dir TEXT NOT NULL DEFAULT '',
    hardlink_dir_preset TEXT NOT NULL DEFAULT 'flat'
);

CREATE TABLE IF NOT EXISTS search_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    filters TEXT NOT NULL DEFAULT '{}',
    selected_indexer_ids TEXT NOT NULL DEFAULT '[]',
    interval_seconds INTEGER NOT NULL DEFAULT 0,
    cooldown_minutes INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    totals TEXT NOT NULL DEFAULT '{}',
    results TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS search_history (
    instance_id INTEGER NOT NULL,
    torrent_hash TEXT NOT NULL,
    last_searched_at TEXT NOT NULL,
    PRIMARY KEY (instance_id, torrent_hash)
);

CREATE TABLE IF NOT EXISTS feed_items (
    guid TEXT NOT NULL,
    indexer_id INTEGER NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    last_status TEXT NOT NULL,
    last_run_id INTEGER,
    info_hash TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (guid, indexer_id)
);

CREATE TABLE IF NOT EXISTS indexer_cooldowns (
    indexer_id INTEGER PRIMARY KEY,
    until TEXT NOT NULL,
    reason TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS instance_completion_settings (
    instance_id INTEGER PRIMARY KEY,
    enabled INTEGER NOT NULL DEFAULT 0,
    category_filters TEXT NOT NULL DEFAULT '[]',
    tag_filters TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS tracker_customizations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    display_name TEXT NOT NULL,
    domains TEXT NOT NULL DEFAULT '[]'
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_initializes_idempotently() {
        let db = Database::connect_in_memory().await.unwrap();
        db.init_schema().await.unwrap();
    }
}
