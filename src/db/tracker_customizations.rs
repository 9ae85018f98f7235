//! Tracker display-name overrides
//!
//! Lets users map raw tracker domains to friendly names used in messages
//! and `by-tracker` link directories.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// A user-provided tracker display customization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerCustomization {
    pub id: i64,
    pub display_name: String,
    pub domains: Vec<String>,
}

impl TrackerCustomization {
    /// Whether this customization covers a tracker domain
    pub fn matches_domain(&self, domain: &str) -> bool {
        let domain = domain.trim().to_lowercase();
        self.domains
            .iter()
            .any(|d| domain == d.to_lowercase() || domain.ends_with(&format!(".{}", d.to_lowercase())))
    }
}

pub struct TrackerCustomizationRepository {
    pool: SqlitePool,
}

impl TrackerCustomizationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, display_name: &str, domains: &[String]) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO tracker_customizations (display_name, domains) VALUES (?1, ?2)",
        )
        .bind(display_name)
        .bind(serde_json::to_string(domains)?)
        .execute(&self.pool)
        .await
        .context("Creating tracker customization")?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list(&self) -> Result<Vec<TrackerCustomization>> {
        let rows = sqlx::query("SELECT * FROM tracker_customizations ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Listing tracker customizations")?;

        rows.iter()
            .map(|row| {
                let domains_raw: String = row.try_get("domains")?;
                Ok(TrackerCustomization {
                    id: row.try_get("id")?,
                    display_name: row.try_get("display_name")?,
                    domains: serde_json::from_str(&domains_raw).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Friendly name for a tracker domain, when one is configured
    pub async fn display_for_domain(&self, domain: &str) -> Result<Option<String>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|c| c.matches_domain(domain))
            .map(|c| c.display_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_domain_lookup() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.tracker_customizations();
        repo.create("MyTracker", &["tracker.example.org".to_string()])
            .await
            .unwrap();

        assert_eq!(
            repo.display_for_domain("tracker.example.org").await.unwrap(),
            Some("MyTracker".to_string())
        );
        assert_eq!(
            repo.display_for_domain("announce.tracker.example.org")
                .await
                .unwrap(),
            Some("MyTracker".to_string())
        );
        assert_eq!(repo.display_for_domain("other.org").await.unwrap(), None);
    }
}
