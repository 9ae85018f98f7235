//! Per-instance completion search settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Whether (and for what) completion events trigger cross-seed searches on
/// an instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionSettings {
    pub instance_id: i64,
    pub enabled: bool,
    /// Only torrents in one of these categories trigger; empty means all
    pub category_filters: Vec<String>,
    /// Only torrents carrying one of these tags trigger; empty means all
    pub tag_filters: Vec<String>,
}

impl CompletionSettings {
    /// Whether a completed torrent passes the configured filters
    pub fn accepts(&self, category: &str, tags: &[String]) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.category_filters.is_empty() && !self.category_filters.iter().any(|c| c == category)
        {
            return false;
        }
        if !self.tag_filters.is_empty()
            && !self.tag_filters.iter().any(|t| tags.iter().any(|tag| tag == t))
        {
            return false;
        }
        true
    }
}

pub struct CompletionSettingsRepository {
    pool: SqlitePool,
}

impl CompletionSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Settings for an instance; disabled defaults when none saved
    pub async fn get(&self, instance_id: i64) -> Result<CompletionSettings> {
        let row = sqlx::query(
            "SELECT * FROM instance_completion_settings WHERE instance_id = ?1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await
        .context("Loading completion settings")?;

        let Some(row) = row else {
            return Ok(CompletionSettings {
                instance_id,
                ..Default::default()
            });
        };

        let categories_raw: String = row.try_get("category_filters")?;
        let tags_raw: String = row.try_get("tag_filters")?;
        Ok(CompletionSettings {
            instance_id,
            enabled: row.try_get("enabled")?,
            category_filters: serde_json::from_str(&categories_raw).unwrap_or_default(),
            tag_filters: serde_json::from_str(&tags_raw).unwrap_or_default(),
        })
    }

    pub async fn upsert(&self, settings: &CompletionSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO instance_completion_settings (
                instance_id, enabled, category_filters, tag_filters
            ) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(instance_id) DO UPDATE SET
                enabled = excluded.enabled,
                category_filters = excluded.category_filters,
                tag_filters = excluded.tag_filters
            "#,
        )
        .bind(settings.instance_id)
        .bind(settings.enabled)
        .bind(serde_json::to_string(&settings.category_filters)?)
        .bind(serde_json::to_string(&settings.tag_filters)?)
        .execute(&self.pool)
        .await
        .context("Saving completion settings")?;
        Ok(())
    }
}
