//! The persisted KG changelog and rollback.
//!
//! Entries are append-only; versions come from the database's autoincrement
//! column, so they are strictly monotonic and assigned atomically with the
//! append.

use crate::db::Database;
use crate::error::{GleanerError, Result};
use chrono::{TimeZone, Utc};
use kg::changelog::ChangelogEntry;
use kg::rollback::reverse_diff_for_rollback;
use kg::store::{ApplyResult, GraphStore};
use kg::{format_diff_summary, Diff};
use serde::Serialize;
use serde_json::Value;
use sqlx::Row;
use tracing::info;

/// Database-backed changelog.
#[derive(Clone, Debug)]
pub struct Changelog {
    db: Database,
}

/// Result of a rollback request.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub from_version: i64,
    pub to_version: i64,
    pub new_version: i64,
    pub apply_result: ApplyResult,
}

impl Changelog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a changelog entry for an applied diff. The next version is
    /// assigned atomically by the insert.
    pub async fn record_kg_change(
        &self,
        diff: &Diff,
        diff_id: &str,
        source_agent: Option<&str>,
        source_document: Option<&str>,
        reason: Option<&str>,
        result: Option<&Value>,
    ) -> Result<ChangelogEntry> {
        let summary = format_diff_summary(diff);
        let diff_json = serde_json::to_string(diff)?;
        let result_json = result.map(|r| r.to_string());
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO kg_changelog (diff_id, timestamp, diff, source_agent, source_document, reason, result, summary)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING version",
        )
        .bind(diff_id)
        .bind(now.timestamp_millis())
        .bind(&diff_json)
        .bind(source_agent)
        .bind(source_document)
        .bind(reason)
        .bind(&result_json)
        .bind(&summary)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to record KG change: {}", e)))?;

        let version: i64 = row.get("version");
        info!(version, diff_id = %diff_id, summary = %summary, "Recorded KG change");

        Ok(ChangelogEntry {
            version,
            diff_id: diff_id.to_string(),
            timestamp: now,
            diff: diff.clone(),
            source_agent: source_agent.map(String::from),
            source_document: source_document.map(String::from),
            reason: reason.map(String::from),
            result: result.cloned(),
            summary,
        })
    }

    /// The current (latest) version, 0 when the changelog is empty.
    pub async fn current_version(&self) -> Result<i64> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM kg_changelog")
                .fetch_one(self.db.pool())
                .await
                .map_err(|e| GleanerError::Database(format!("Failed to read version: {}", e)))?;
        Ok(version.unwrap_or(0))
    }

    /// Load a specific version.
    pub async fn get_version(&self, version: i64) -> Result<Option<ChangelogEntry>> {
        let row = sqlx::query(
            "SELECT version, diff_id, timestamp, diff, source_agent, source_document, reason, result, summary
             FROM kg_changelog WHERE version = ?",
        )
        .bind(version)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to load version: {}", e)))?;

        row.map(row_to_entry).transpose()
    }

    /// Recent versions, most recent first.
    pub async fn list_versions(&self, limit: i64) -> Result<Vec<ChangelogEntry>> {
        let rows = sqlx::query(
            "SELECT version, diff_id, timestamp, diff, source_agent, source_document, reason, result, summary
             FROM kg_changelog ORDER BY version DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to list versions: {}", e)))?;

        rows.into_iter().map(row_to_entry).collect()
    }

    /// Entries strictly after `after_version`, ascending.
    pub async fn entries_after(&self, after_version: i64) -> Result<Vec<ChangelogEntry>> {
        let rows = sqlx::query(
            "SELECT version, diff_id, timestamp, diff, source_agent, source_document, reason, result, summary
             FROM kg_changelog WHERE version > ? ORDER BY version ASC",
        )
        .bind(after_version)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to load entries: {}", e)))?;

        rows.into_iter().map(row_to_entry).collect()
    }

    /// Roll the graph back to `target_version`: synthesize the reverse diff
    /// over every newer entry, apply it, and append a rollback entry.
    pub async fn rollback_to(
        &self,
        store: &dyn GraphStore,
        target_version: i64,
    ) -> Result<RollbackOutcome> {
        let current = self.current_version().await?;
        let entries = self.entries_after(target_version).await?;
        let reverse = reverse_diff_for_rollback(&entries, target_version, current)?;

        let apply_result = store.apply_diff(&reverse).await?;
        if !apply_result.success {
            return Err(GleanerError::Other(format!(
                "Rollback diff application failed: {:?}",
                apply_result.errors
            )));
        }

        let reason = reverse.metadata.reason.clone();
        let entry = self
            .record_kg_change(
                &reverse,
                &kg::diff::create_diff_id(),
                Some("rollback_system"),
                None,
                reason.as_deref(),
                Some(&serde_json::to_value(&apply_result)?),
            )
            .await?;

        info!(
            from = current,
            to = target_version,
            new_version = entry.version,
            "Rolled back knowledge graph"
        );

        Ok(RollbackOutcome {
            from_version: current,
            to_version: target_version,
            new_version: entry.version,
            apply_result,
        })
    }
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Result<ChangelogEntry> {
    let diff_json: String = row.get("diff");
    let result_json: Option<String> = row.get("result");
    let timestamp_ms: i64 = row.get("timestamp");
    Ok(ChangelogEntry {
        version: row.get("version"),
        diff_id: row.get("diff_id"),
        timestamp: Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .unwrap_or_else(Utc::now),
        diff: serde_json::from_str(&diff_json)?,
        source_agent: row.get("source_agent"),
        source_document: row.get("source_document"),
        reason: row.get("reason"),
        result: result_json.and_then(|r| serde_json::from_str(&r).ok()),
        summary: row.get("summary"),
    })
}
