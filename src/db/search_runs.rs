//! Search run persistence
//!
//! A run row is created `running`, mutated as candidates process, and
//! closed exactly once to a terminal status. Terminal rows are never
//! transitioned again; the update statements guard on `status = 'running'`.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Lifecycle status of a search run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Cancelled,
    Partial,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            "partial" => Some(RunStatus::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-run counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunTotals {
    pub searched: u32,
    pub skipped: u32,
    pub matched: u32,
    pub added: u32,
    pub failed: u32,
}

/// Outcome recorded for one candidate (or one accepted indexer result)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRunResult {
    pub torrent_hash: String,
    pub torrent_name: String,
    pub indexer_id: Option<i64>,
    pub indexer_name: Option<String>,
    pub status: String,
    pub message: String,
    pub match_score: Option<u32>,
    pub match_reasons: Vec<String>,
}

/// Persistent record of a search run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRunRecord {
    pub id: i64,
    pub instance_id: i64,
    pub status: RunStatus,
    pub filters: serde_json::Value,
    pub selected_indexer_ids: Vec<i64>,
    pub interval_seconds: i64,
    pub cooldown_minutes: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub totals: RunTotals,
    pub results: Vec<SearchRunResult>,
}

pub struct SearchRunRepository {
    pool: SqlitePool,
}

impl SearchRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new `running` run and return it
    pub async fn create(
        &self,
        instance_id: i64,
        filters: serde_json::Value,
        selected_indexer_ids: &[i64],
        interval_seconds: i64,
        cooldown_minutes: i64,
    ) -> Result<SearchRunRecord> {
        let started_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO search_runs (
                instance_id, status, filters, selected_indexer_ids,
                interval_seconds, cooldown_minutes, started_at, totals, results
            ) VALUES (?1, 'running', ?2, ?3, ?4, ?5, ?6, '{}', '[]')
            "#,
        )
        .bind(instance_id)
        .bind(filters.to_string())
        .bind(serde_json::to_string(selected_indexer_ids)?)
        .bind(interval_seconds)
        .bind(cooldown_minutes)
        .bind(started_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Creating search run")?;

        self.get(result.last_insert_rowid())
            .await?
            .context("Search run vanished after insert")
    }

    pub async fn get(&self, id: i64) -> Result<Option<SearchRunRecord>> {
        let row = sqlx::query("SELECT * FROM search_runs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Loading search run")?;
        row.map(|r| from_row(&r)).transpose()
    }

    /// Latest runs for display, newest first
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<SearchRunRecord>> {
        let rows = sqlx::query("SELECT * FROM search_runs ORDER BY id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Listing search runs")?;
        rows.iter().map(from_row).collect()
    }

    /// Save progress on a still-running run
    pub async fn update_progress(
        &self,
        id: i64,
        totals: &RunTotals,
        results: &[SearchRunResult],
    ) -> Result<()> {
        sqlx::query(
            "UPDATE search_runs SET totals = ?1, results = ?2 WHERE id = ?3 AND status = 'running'",
        )
        .bind(serde_json::to_string(totals)?)
        .bind(serde_json::to_string(results)?)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Updating search run progress")?;
        Ok(())
    }

    /// Close a run to a terminal status. Refuses to touch a run that
    /// already reached one.
    pub async fn close(
        &self,
        id: i64,
        status: RunStatus,
        totals: &RunTotals,
        results: &[SearchRunResult],
    ) -> Result<()> {
        if !status.is_terminal() {
            bail!("Refusing to close run {} to non-terminal status {}", id, status);
        }
        let updated = sqlx::query(
            r#"
            UPDATE search_runs
            SET status = ?1, totals = ?2, results = ?3, completed_at = ?4
            WHERE id = ?5 AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(serde_json::to_string(totals)?)
        .bind(serde_json::to_string(results)?)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Closing search run")?;

        if updated.rows_affected() == 0 {
            bail!("Search run {} is not running; terminal status is final", id);
        }
        Ok(())
    }
}

fn from_row(row: &SqliteRow) -> Result<SearchRunRecord> {
    let status_raw: String = row.try_get("status")?;
    let status = RunStatus::parse(&status_raw)
        .with_context(|| format!("Unknown run status '{}'", status_raw))?;

    let filters_raw: String = row.try_get("filters")?;
    let selected_raw: String = row.try_get("selected_indexer_ids")?;
    let totals_raw: String = row.try_get("totals")?;
    let results_raw: String = row.try_get("results")?;
    let started_raw: String = row.try_get("started_at")?;
    let completed_raw: Option<String> = row.try_get("completed_at")?;

    Ok(SearchRunRecord {
        id: row.try_get("id")?,
        instance_id: row.try_get("instance_id")?,
        status,
        filters: serde_json::from_str(&filters_raw).unwrap_or(serde_json::Value::Null),
        selected_indexer_ids: serde_json::from_str(&selected_raw).unwrap_or_default(),
        interval_seconds: row.try_get("interval_seconds")?,
        cooldown_minutes: row.try_get("cooldown_minutes")?,
        started_at: DateTime::parse_from_rfc3339(&started_raw)
            .context("Bad started_at timestamp")?
            .with_timezone(&Utc),
        completed_at: completed_raw
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .context("Bad completed_at timestamp")
            })
            .transpose()?,
        totals: serde_json::from_str(&totals_raw).unwrap_or_default(),
        results: serde_json::from_str(&results_raw).unwrap_or_default(),
    })
}
