//! Managed client instances

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use sqlx::sqlite::SqliteRow;

/// A managed torrent-client instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    /// Whether this process can see the instance's filesystem directly;
    /// required for link modes
    pub has_local_filesystem_access: bool,
    pub use_hardlinks: bool,
    pub use_reflinks: bool,
    /// Fall back to direct mode when reflinks are configured but the
    /// filesystem cannot provide them
    pub fallback_to_regular_mode: bool,
    pub hardlink_base_dir: String,
    pub hardlink_dir_preset: String,
}

impl InstanceRecord {
    /// Whether any link mode is enabled for this instance
    pub fn link_mode_enabled(&self) -> bool {
        self.use_hardlinks || self.use_reflinks
    }
}

/// Fields for creating an instance
#[derive(Debug, Clone, Default)]
pub struct CreateInstance {
    pub name: String,
    pub enabled: bool,
    pub has_local_filesystem_access: bool,
    pub use_hardlinks: bool,
    pub use_reflinks: bool,
    pub fallback_to_regular_mode: bool,
    pub hardlink_base_dir: String,
    pub hardlink_dir_preset: String,
}

pub struct InstanceRepository {
    pool: SqlitePool,
}

impl InstanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, create: &CreateInstance) -> Result<InstanceRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO instances (
                name, enabled, has_local_filesystem_access, use_hardlinks,
                use_reflinks, fallback_to_regular_mode, hardlink_base_dir,
                hardlink_dir_preset
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&create.name)
        .bind(create.enabled)
        .bind(create.has_local_filesystem_access)
        .bind(create.use_hardlinks)
        .bind(create.use_reflinks)
        .bind(create.fallback_to_regular_mode)
        .bind(&create.hardlink_base_dir)
        .bind(&create.hardlink_dir_preset)
        .execute(&self.pool)
        .await
        .context("Creating instance")?;

        self.get(result.last_insert_rowid())
            .await?
            .context("Instance vanished after insert")
    }

    pub async fn get(&self, id: i64) -> Result<Option<InstanceRecord>> {
        let row = sqlx::query("SELECT * FROM instances WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Loading instance")?;
        row.map(|r| from_row(&r)).transpose()
    }

    /// All instances, enabled first, stable by id
    pub async fn list(&self) -> Result<Vec<InstanceRecord>> {
        let rows = sqlx::query("SELECT * FROM instances ORDER BY enabled DESC, id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Listing instances")?;
        rows.iter().map(from_row).collect()
    }

    /// Only instances eligible for cross-seeding
    pub async fn list_enabled(&self) -> Result<Vec<InstanceRecord>> {
        Ok(self.list().await?.into_iter().filter(|i| i.enabled).collect())
    }
}

fn from_row(row: &SqliteRow) -> Result<InstanceRecord> {
    Ok(InstanceRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        enabled: row.try_get("enabled")?,
        has_local_filesystem_access: row.try_get("has_local_filesystem_access")?,
        use_hardlinks: row.try_get("use_hardlinks")?,
        use_reflinks: row.try_get("use_reflinks")?,
        fallback_to_regular_mode: row.try_get("fallback_to_regular_mode")?,
        hardlink_base_dir: row.try_get("hardlink_base_dir")?,
        hardlink_dir_preset: row.try_get("hardlink_dir_preset")?,
    })
}
