//! Per-instance search history
//!
//! Records when each torrent was last searched so the run refresh can skip
//! anything still inside its cooldown window.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::util::paths::normalize_hash;

pub struct SearchHistoryRepository {
    pool: SqlitePool,
}

impl SearchHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a search for (instance, hash) at `when`
    pub async fn record_search(
        &self,
        instance_id: i64,
        torrent_hash: &str,
        when: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_history (instance_id, torrent_hash, last_searched_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(instance_id, torrent_hash)
            DO UPDATE SET last_searched_at = excluded.last_searched_at
            "#,
        )
        .bind(instance_id)
        .bind(normalize_hash(torrent_hash))
        .bind(when.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Recording search history")?;
        Ok(())
    }

    /// When (instance, hash) was last searched
    pub async fn last_search(
        &self,
        instance_id: i64,
        torrent_hash: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT last_searched_at FROM search_history WHERE instance_id = ?1 AND torrent_hash = ?2",
        )
        .bind(instance_id)
        .bind(normalize_hash(torrent_hash))
        .fetch_optional(&self.pool)
        .await
        .context("Loading search history")?;

        row.map(|r| {
            let raw: String = r.try_get("last_searched_at")?;
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .context("Bad last_searched_at timestamp")
        })
        .transpose()
    }

    /// Whether (instance, hash) is still cooling down
    pub async fn is_within_cooldown(
        &self,
        instance_id: i64,
        torrent_hash: &str,
        cooldown_minutes: i64,
    ) -> Result<bool> {
        let Some(last) = self.last_search(instance_id, torrent_hash).await? else {
            return Ok(false);
        };
        Ok(Utc::now() - last < Duration::minutes(cooldown_minutes))
    }

    /// Drop rows older than the retention window
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_history WHERE last_searched_at < ?1")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Pruning search history")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_cooldown_window() {
        let db = Database::connect_in_memory().await.unwrap();
        let history = db.search_history();

        assert!(!history.is_within_cooldown(1, "ABCDEF", 60).await.unwrap());

        history.record_search(1, "ABCDEF", Utc::now()).await.unwrap();
        assert!(history.is_within_cooldown(1, "abcdef", 60).await.unwrap());

        let old = Utc::now() - Duration::minutes(120);
        history.record_search(1, "abcdef", old).await.unwrap();
        assert!(!history.is_within_cooldown(1, "ABCDEF", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune() {
        let db = Database::connect_in_memory().await.unwrap();
        let history = db.search_history();
        history
            .record_search(1, "aa", Utc::now() - Duration::days(30))
            .await
            .unwrap();
        history.record_search(1, "bb", Utc::now()).await.unwrap();

        let removed = history
            .prune_older_than(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(history.last_search(1, "bb").await.unwrap().is_some());
    }
}
