//! Indexer result dedup cache
//!
//! Remembers what each indexer result GUID last resolved to so repeated
//! runs within the retention window do not re-process the same feed items.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// How a feed item was last handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedItemStatus {
    Processed,
    Skipped,
    Failed,
}

impl FeedItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedItemStatus::Processed => "processed",
            FeedItemStatus::Skipped => "skipped",
            FeedItemStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(FeedItemStatus::Processed),
            "skipped" => Some(FeedItemStatus::Skipped),
            "failed" => Some(FeedItemStatus::Failed),
            _ => None,
        }
    }
}

/// Cached disposition of one indexer result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItemRecord {
    pub guid: String,
    pub indexer_id: i64,
    pub title: String,
    pub last_status: FeedItemStatus,
    pub last_run_id: Option<i64>,
    pub info_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub struct FeedItemRepository {
    pool: SqlitePool,
}

impl FeedItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, record: &FeedItemRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feed_items (
                guid, indexer_id, title, last_status, last_run_id, info_hash, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(guid, indexer_id) DO UPDATE SET
                title = excluded.title,
                last_status = excluded.last_status,
                last_run_id = excluded.last_run_id,
                info_hash = excluded.info_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.guid)
        .bind(record.indexer_id)
        .bind(&record.title)
        .bind(record.last_status.as_str())
        .bind(record.last_run_id)
        .bind(&record.info_hash)
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Upserting feed item")?;
        Ok(())
    }

    pub async fn get(&self, guid: &str, indexer_id: i64) -> Result<Option<FeedItemRecord>> {
        let row = sqlx::query("SELECT * FROM feed_items WHERE guid = ?1 AND indexer_id = ?2")
            .bind(guid)
            .bind(indexer_id)
            .fetch_optional(&self.pool)
            .await
            .context("Loading feed item")?;
        row.map(|r| from_row(&r)).transpose()
    }

    /// Drop rows last touched before the cutoff
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM feed_items WHERE updated_at < ?1")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Pruning feed items")?;
        Ok(result.rows_affected())
    }
}

fn from_row(row: &SqliteRow) -> Result<FeedItemRecord> {
    let status_raw: String = row.try_get("last_status")?;
    let updated_raw: String = row.try_get("updated_at")?;
    Ok(FeedItemRecord {
        guid: row.try_get("guid")?,
        indexer_id: row.try_get("indexer_id")?,
        title: row.try_get("title")?,
        last_status: FeedItemStatus::parse(&status_raw)
            .with_context(|| format!("Unknown feed item status '{}'", status_raw))?,
        last_run_id: row.try_get("last_run_id")?,
        info_hash: row.try_get("info_hash")?,
        updated_at: DateTime::parse_from_rfc3339(&updated_raw)
            .context("Bad updated_at timestamp")?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.feed_items();

        let record = FeedItemRecord {
            guid: "guid-1".to_string(),
            indexer_id: 3,
            title: "Show.S01E05".to_string(),
            last_status: FeedItemStatus::Processed,
            last_run_id: Some(9),
            info_hash: Some("abc".to_string()),
            updated_at: Utc::now(),
        };
        repo.upsert(&record).await.unwrap();

        let loaded = repo.get("guid-1", 3).await.unwrap().unwrap();
        assert_eq!(loaded.last_status, FeedItemStatus::Processed);
        assert_eq!(loaded.last_run_id, Some(9));

        // Same guid on a different indexer is a separate row
        assert!(repo.get("guid-1", 4).await.unwrap().is_none());
    }
}
