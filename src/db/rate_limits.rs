//! Persistent indexer cooldowns
//!
//! Rate-limit waits survive process restarts so a relaunch cannot hammer an
//! indexer that asked for a pause.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct RateLimitRepository {
    pool: SqlitePool,
}

impl RateLimitRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record that an indexer must not be queried until `until`
    pub async fn set_cooldown(
        &self,
        indexer_id: i64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexer_cooldowns (indexer_id, until, reason, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(indexer_id) DO UPDATE SET
                until = excluded.until,
                reason = excluded.reason,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(indexer_id)
        .bind(until.to_rfc3339())
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Saving indexer cooldown")?;
        Ok(())
    }

    /// The active cooldown for an indexer, if any
    pub async fn cooldown_until(&self, indexer_id: i64) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT until FROM indexer_cooldowns WHERE indexer_id = ?1")
            .bind(indexer_id)
            .fetch_optional(&self.pool)
            .await
            .context("Loading indexer cooldown")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("until")?;
        let until = DateTime::parse_from_rfc3339(&raw)
            .context("Bad cooldown timestamp")?
            .with_timezone(&Utc);
        Ok((until > Utc::now()).then_some(until))
    }

    /// All cooldowns still in the future, as (indexer id, until)
    pub async fn active_cooldowns(&self) -> Result<Vec<(i64, DateTime<Utc>)>> {
        let rows = sqlx::query("SELECT indexer_id, until FROM indexer_cooldowns WHERE until > ?1")
            .bind(Utc::now().to_rfc3339())
            .fetch_all(&self.pool)
            .await
            .context("Listing indexer cooldowns")?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("indexer_id")?;
                let raw: String = row.try_get("until")?;
                let until = DateTime::parse_from_rfc3339(&raw)
                    .context("Bad cooldown timestamp")?
                    .with_timezone(&Utc);
                Ok((id, until))
            })
            .collect()
    }

    /// Drop cooldowns that already expired
    pub async fn clear_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM indexer_cooldowns WHERE until <= ?1")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Clearing expired cooldowns")?;
        Ok(result.rows_affected())
    }
}
