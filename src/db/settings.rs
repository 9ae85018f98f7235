//! Automation settings store
//!
//! A single settings row drives scheduled runs and fills the defaults a
//! webhook caller does not override.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Engine-wide automation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationSettings {
    pub interval_hours: i64,
    pub cooldown_minutes: i64,
    pub max_results_per_indexer: i64,
    /// Allowed total-size deviation between a new torrent and its match
    pub size_tolerance_percent: f64,
    pub ignore_patterns: Vec<String>,
    pub find_individual_episodes: bool,
    pub add_cross_seed_tag: bool,
    pub start_paused: bool,
    pub skip_if_exists: bool,
    pub disable_torznab: bool,
    pub gazelle_enabled: bool,
    pub red_api_key: Option<String>,
    pub ops_api_key: Option<String>,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            cooldown_minutes: 24 * 60,
            max_results_per_indexer: 50,
            size_tolerance_percent: 2.0,
            ignore_patterns: vec![
                ".nfo".to_string(),
                ".txt".to_string(),
                ".srt".to_string(),
                "*sample*".to_string(),
            ],
            find_individual_episodes: false,
            add_cross_seed_tag: true,
            start_paused: false,
            skip_if_exists: true,
            disable_torznab: false,
            gazelle_enabled: false,
            red_api_key: None,
            ops_api_key: None,
        }
    }
}

/// Repository for the single automation settings row
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load settings; defaults when nothing was saved yet
    pub async fn get(&self) -> Result<AutomationSettings> {
        let row = sqlx::query("SELECT * FROM cross_seed_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Loading automation settings")?;

        let Some(row) = row else {
            return Ok(AutomationSettings::default());
        };

        let ignore_patterns: String = row.try_get("ignore_patterns")?;
        Ok(AutomationSettings {
            interval_hours: row.try_get("interval_hours")?,
            cooldown_minutes: row.try_get("cooldown_minutes")?,
            max_results_per_indexer: row.try_get("max_results_per_indexer")?,
            size_tolerance_percent: row.try_get("size_tolerance_percent")?,
            ignore_patterns: serde_json::from_str(&ignore_patterns).unwrap_or_default(),
            find_individual_episodes: row.try_get("find_individual_episodes")?,
            add_cross_seed_tag: row.try_get("add_cross_seed_tag")?,
            start_paused: row.try_get("start_paused")?,
            skip_if_exists: row.try_get("skip_if_exists")?,
            disable_torznab: row.try_get("disable_torznab")?,
            gazelle_enabled: row.try_get("gazelle_enabled")?,
            red_api_key: row.try_get("red_api_key")?,
            ops_api_key: row.try_get("ops_api_key")?,
        })
    }

    /// Persist the settings row, replacing whatever was there
    pub async fn update(&self, settings: &AutomationSettings) -> Result<()> {
        let ignore_patterns = serde_json::to_string(&settings.ignore_patterns)?;
        sqlx::query(
            r#"
            INSERT INTO cross_seed_settings (
                id, interval_hours, cooldown_minutes, max_results_per_indexer,
                size_tolerance_percent, ignore_patterns, find_individual_episodes,
                add_cross_seed_tag, start_paused, skip_if_exists, disable_torznab,
                gazelle_enabled, red_api_key, ops_api_key, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                interval_hours = excluded.interval_hours,
                cooldown_minutes = excluded.cooldown_minutes,
                max_results_per_indexer = excluded.max_results_per_indexer,
                size_tolerance_percent = excluded.size_tolerance_percent,
                ignore_patterns = excluded.ignore_patterns,
                find_individual_episodes = excluded.find_individual_episodes,
                add_cross_seed_tag = excluded.add_cross_seed_tag,
                start_paused = excluded.start_paused,
                skip_if_exists = excluded.skip_if_exists,
                disable_torznab = excluded.disable_torznab,
                gazelle_enabled = excluded.gazelle_enabled,
                red_api_key = excluded.red_api_key,
                ops_api_key = excluded.ops_api_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(settings.interval_hours)
        .bind(settings.cooldown_minutes)
        .bind(settings.max_results_per_indexer)
        .bind(settings.size_tolerance_percent)
        .bind(ignore_patterns)
        .bind(settings.find_individual_episodes)
        .bind(settings.add_cross_seed_tag)
        .bind(settings.start_paused)
        .bind(settings.skip_if_exists)
        .bind(settings.disable_torznab)
        .bind(settings.gazelle_enabled)
        .bind(&settings.red_api_key)
        .bind(&settings.ops_api_key)
        .execute(&self.pool)
        .await
        .context("Saving automation settings")?;
        Ok(())
    }
}
