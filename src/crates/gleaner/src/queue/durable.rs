//! The durable task queue.
//!
//! Tasks survive restarts and are retried with bounded attempts. Dequeue
//! claims rows atomically with a single `UPDATE … WHERE task_id IN (SELECT …)
//! RETURNING` statement — the SQLite rendition of `FOR UPDATE SKIP LOCKED`
//! row claiming — so two concurrent dequeues never return the same task.

use crate::db::Database;
use crate::error::{GleanerError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Task status in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    DeadLetter,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::DeadLetter => "dead_letter",
        }
    }

    fn from_str(s: &str) -> TaskStatus {
        match s {
            "pending" => TaskStatus::Pending,
            "in_progress" => TaskStatus::InProgress,
            "completed" => TaskStatus::Completed,
            "dead_letter" => TaskStatus::DeadLetter,
            _ => TaskStatus::Failed,
        }
    }
}

/// A task record in the durable queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub task_type: String,
    pub payload: Value,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub error: Option<String>,
    pub result: Option<Value>,
    pub domain: Option<String>,
    pub source: Option<String>,
    pub agent: Option<String>,
    pub heartbeat_at: Option<DateTime<Utc>>,
}

/// Optional enqueue labels.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub domain: Option<String>,
    pub source: Option<String>,
    pub agent: Option<String>,
    pub max_retries: Option<i64>,
}

const TASK_COLUMNS: &str = "task_id, task_type, payload, status, created_at, updated_at, \
     started_at, completed_at, retry_count, max_retries, error, result, \
     domain, source, agent, heartbeat_at";

/// Durable task queue backed by the shared database.
#[derive(Clone, Debug)]
pub struct DurableQueue {
    db: Database,
}

impl DurableQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Enqueue a task; returns its id.
    pub async fn enqueue(
        &self,
        task_type: &str,
        payload: Value,
        options: EnqueueOptions,
    ) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO task_queue (task_id, task_type, payload, status, created_at, updated_at,
                                     retry_count, max_retries, domain, source, agent)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
        )
        .bind(&task_id)
        .bind(task_type)
        .bind(payload.to_string())
        .bind(TaskStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .bind(options.max_retries.unwrap_or(3))
        .bind(&options.domain)
        .bind(&options.source)
        .bind(&options.agent)
        .execute(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to enqueue task: {}", e)))?;

        info!(task_id = %task_id, task_type = %task_type, "Enqueued task");
        Ok(task_id)
    }

    /// Dequeue up to `limit` pending tasks, oldest first, atomically marking
    /// them in-progress with a fresh heartbeat.
    pub async fn dequeue(&self, task_type: Option<&str>, limit: i64) -> Result<Vec<TaskRecord>> {
        let now = Utc::now().timestamp_millis();

        // Claim and return in one statement so concurrent workers are safe.
        let rows = if let Some(task_type) = task_type {
            sqlx::query(&format!(
                "UPDATE task_queue
                 SET status = 'in_progress', updated_at = ?,
                     started_at = COALESCE(started_at, ?), heartbeat_at = ?
                 WHERE task_id IN (
                     SELECT task_id FROM task_queue
                     WHERE status = 'pending' AND task_type = ?
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?
                 )
                 RETURNING {TASK_COLUMNS}"
            ))
            .bind(now)
            .bind(now)
            .bind(now)
            .bind(task_type)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await
        } else {
            sqlx::query(&format!(
                "UPDATE task_queue
                 SET status = 'in_progress', updated_at = ?,
                     started_at = COALESCE(started_at, ?), heartbeat_at = ?
                 WHERE task_id IN (
                     SELECT task_id FROM task_queue
                     WHERE status = 'pending'
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?
                 )
                 RETURNING {TASK_COLUMNS}"
            ))
            .bind(now)
            .bind(now)
            .bind(now)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await
        }
        .map_err(|e| GleanerError::Database(format!("Failed to dequeue tasks: {}", e)))?;

        let mut tasks: Vec<TaskRecord> =
            rows.into_iter().map(row_to_task).collect::<Result<_>>()?;
        // RETURNING row order is unspecified; restore enqueue order. The
        // sort is stable, so same-millisecond rows keep their rowid order.
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    /// Mark a task completed.
    pub async fn complete(&self, task_id: &str, result: Option<Value>) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "UPDATE task_queue SET status = 'completed', updated_at = ?, completed_at = ?, result = ?
             WHERE task_id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(result.map(|r| r.to_string()))
        .bind(task_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to complete task: {}", e)))?;
        Ok(())
    }

    /// Mark a task failed. With retries remaining (and `retry` set) it
    /// returns to pending; otherwise it moves to the dead-letter queue.
    pub async fn fail(&self, task_id: &str, error: &str, retry: bool) -> Result<()> {
        let row = sqlx::query("SELECT retry_count, max_retries FROM task_queue WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| GleanerError::Database(format!("Failed to read task: {}", e)))?;
        let Some(row) = row else {
            return Ok(());
        };
        let retry_count: i64 = row.get("retry_count");
        let max_retries: i64 = row.get("max_retries");

        let now = Utc::now().timestamp_millis();
        let error = tooling::logging::truncate_for_log(error);

        if retry && retry_count < max_retries {
            sqlx::query(
                "UPDATE task_queue
                 SET status = 'pending', updated_at = ?, retry_count = retry_count + 1,
                     error = ?, started_at = NULL, heartbeat_at = NULL
                 WHERE task_id = ?",
            )
            .bind(now)
            .bind(&error)
            .bind(task_id)
            .execute(self.db.pool())
            .await
            .map_err(|e| GleanerError::Database(format!("Failed to fail task: {}", e)))?;
            info!(
                task_id = %task_id,
                attempt = retry_count + 1,
                max_retries,
                "Task failed, will retry"
            );
        } else {
            sqlx::query(
                "UPDATE task_queue
                 SET status = 'dead_letter', updated_at = ?, error = ?, completed_at = ?
                 WHERE task_id = ?",
            )
            .bind(now)
            .bind(&error)
            .bind(now)
            .bind(task_id)
            .execute(self.db.pool())
            .await
            .map_err(|e| GleanerError::Database(format!("Failed to dead-letter task: {}", e)))?;
            warn!(task_id = %task_id, retry_count, "Task moved to dead-letter queue");
        }
        Ok(())
    }

    /// Update the heartbeat of an in-progress task.
    pub async fn heartbeat(&self, task_id: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "UPDATE task_queue SET heartbeat_at = ?, updated_at = ?
             WHERE task_id = ? AND status = 'in_progress'",
        )
        .bind(now)
        .bind(now)
        .bind(task_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to heartbeat: {}", e)))?;
        debug!(task_id = %task_id, "Heartbeat");
        Ok(())
    }

    /// In-progress tasks whose heartbeat is stale or missing.
    pub async fn stuck_tasks(&self, threshold_minutes: i64) -> Result<Vec<TaskRecord>> {
        let cutoff = Utc::now().timestamp_millis() - threshold_minutes * 60_000;
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM task_queue
             WHERE status = 'in_progress' AND (heartbeat_at IS NULL OR heartbeat_at < ?)
             ORDER BY updated_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to find stuck tasks: {}", e)))?;
        rows.into_iter().map(row_to_task).collect()
    }

    /// Tasks in the dead-letter queue, most recent first.
    pub async fn dead_letter_tasks(&self, limit: i64) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM task_queue
             WHERE status = 'dead_letter' ORDER BY updated_at DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to list dead-letter tasks: {}", e)))?;
        rows.into_iter().map(row_to_task).collect()
    }

    /// Load a task by id.
    pub async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM task_queue WHERE task_id = ?"
        ))
        .bind(task_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to load task: {}", e)))?;
        row.map(row_to_task).transpose()
    }

    /// Reset a task to pending, bumping its retry count (stuck-task
    /// reclaim).
    pub async fn reset_for_retry(&self, task_id: &str, error: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "UPDATE task_queue
             SET status = 'pending', updated_at = ?, retry_count = retry_count + 1,
                 error = ?, started_at = NULL, heartbeat_at = NULL
             WHERE task_id = ?",
        )
        .bind(now)
        .bind(error)
        .bind(task_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to reset task: {}", e)))?;
        Ok(())
    }

    /// Move a task from the dead-letter queue back to pending, optionally
    /// with a replacement payload, clearing its retry budget.
    pub async fn revive(&self, task_id: &str, updated_payload: Option<Value>) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        match updated_payload {
            Some(payload) => {
                sqlx::query(
                    "UPDATE task_queue
                     SET status = 'pending', updated_at = ?, payload = ?, retry_count = 0,
                         error = NULL, started_at = NULL, heartbeat_at = NULL
                     WHERE task_id = ?",
                )
                .bind(now)
                .bind(payload.to_string())
                .bind(task_id)
                .execute(self.db.pool())
                .await
            }
            None => {
                sqlx::query(
                    "UPDATE task_queue
                     SET status = 'pending', updated_at = ?, retry_count = 0,
                         error = NULL, started_at = NULL, heartbeat_at = NULL
                     WHERE task_id = ?",
                )
                .bind(now)
                .bind(task_id)
                .execute(self.db.pool())
                .await
            }
        }
        .map_err(|e| GleanerError::Database(format!("Failed to revive task: {}", e)))?;
        Ok(())
    }

    /// Mark a stuck task dead-letter without further retries.
    pub async fn dead_letter(&self, task_id: &str, error: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "UPDATE task_queue SET status = 'dead_letter', updated_at = ?, error = ?
             WHERE task_id = ?",
        )
        .bind(now)
        .bind(error)
        .bind(task_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to dead-letter task: {}", e)))?;
        Ok(())
    }

    /// Count tasks per status for telemetry.
    pub async fn status_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows =
            sqlx::query("SELECT status, COUNT(*) as count FROM task_queue GROUP BY status")
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| GleanerError::Database(format!("Failed to count tasks: {}", e)))?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("status"), r.get::<i64, _>("count")))
            .collect())
    }

    /// Recently updated tasks for telemetry.
    pub async fn recent_tasks(&self, limit: i64) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM task_queue ORDER BY updated_at DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to list recent tasks: {}", e)))?;
        rows.into_iter().map(row_to_task).collect()
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn row_to_task(row: sqlx::sqlite::SqliteRow) -> Result<TaskRecord> {
    let payload_json: String = row.get("payload");
    let result_json: Option<String> = row.get("result");
    let status: String = row.get("status");
    Ok(TaskRecord {
        task_id: row.get("task_id"),
        task_type: row.get("task_type"),
        payload: serde_json::from_str(&payload_json).unwrap_or(Value::Null),
        status: TaskStatus::from_str(&status),
        created_at: millis_to_datetime(row.get("created_at")),
        updated_at: millis_to_datetime(row.get("updated_at")),
        started_at: row.get::<Option<i64>, _>("started_at").map(millis_to_datetime),
        completed_at: row
            .get::<Option<i64>, _>("completed_at")
            .map(millis_to_datetime),
        retry_count: row.get("retry_count"),
        max_retries: row.get("max_retries"),
        error: row.get("error"),
        result: result_json.and_then(|r| serde_json::from_str(&r).ok()),
        domain: row.get("domain"),
        source: row.get("source"),
        agent: row.get("agent"),
        heartbeat_at: row
            .get::<Option<i64>, _>("heartbeat_at")
            .map(millis_to_datetime),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn queue() -> DurableQueue {
        DurableQueue::new(Database::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_enqueue_dequeue_lifecycle() {
        let queue = queue().await;
        let task_id = queue
            .enqueue("graph_run", json!({"chat_id": "42"}), EnqueueOptions::default())
            .await
            .unwrap();

        let tasks = queue.dequeue(None, 1).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, task_id);
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
        assert!(tasks[0].started_at.is_some());
        assert!(tasks[0].heartbeat_at.is_some());

        // Nothing left to dequeue.
        assert!(queue.dequeue(None, 1).await.unwrap().is_empty());

        queue
            .complete(&task_id, Some(json!({"ok": true})))
            .await
            .unwrap();
        let task = queue.get(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert_eq!(task.result.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn test_dequeue_oldest_first_and_type_filter() {
        let queue = queue().await;
        let first = queue
            .enqueue("graph_run", json!({"n": 1}), EnqueueOptions::default())
            .await
            .unwrap();
        queue
            .enqueue("mission_continue", json!({"n": 2}), EnqueueOptions::default())
            .await
            .unwrap();
        let third = queue
            .enqueue("graph_run", json!({"n": 3}), EnqueueOptions::default())
            .await
            .unwrap();

        let tasks = queue.dequeue(Some("graph_run"), 10).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_id, first);
        assert_eq!(tasks[1].task_id, third);
    }

    #[tokio::test]
    async fn test_concurrent_dequeues_disjoint() {
        let queue = queue().await;
        for i in 0..10 {
            queue
                .enqueue("graph_run", json!({"n": i}), EnqueueOptions::default())
                .await
                .unwrap();
        }

        let (a, b) = tokio::join!(queue.dequeue(None, 5), queue.dequeue(None, 5));
        let a = a.unwrap();
        let b = b.unwrap();

        let mut ids: Vec<String> = a
            .iter()
            .chain(b.iter())
            .map(|t| t.task_id.clone())
            .collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before, "two dequeues returned the same task");
        assert_eq!(before, 10);
    }

    #[tokio::test]
    async fn test_fail_retries_then_dead_letters() {
        let queue = queue().await;
        let task_id = queue
            .enqueue(
                "graph_run",
                json!({}),
                EnqueueOptions {
                    max_retries: Some(2),
                    ..EnqueueOptions::default()
                },
            )
            .await
            .unwrap();

        for attempt in 1..=2 {
            let tasks = queue.dequeue(None, 1).await.unwrap();
            assert_eq!(tasks.len(), 1);
            queue.fail(&task_id, "boom", true).await.unwrap();
            let task = queue.get(&task_id).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Pending, "attempt {}", attempt);
            assert_eq!(task.retry_count, attempt);
            assert!(task.started_at.is_none());
            assert!(task.heartbeat_at.is_none());
        }

        // Third failure exhausts max_retries=2.
        queue.dequeue(None, 1).await.unwrap();
        queue.fail(&task_id, "boom again", true).await.unwrap();
        let task = queue.get(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::DeadLetter);

        let dlq = queue.dead_letter_tasks(10).await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].error.as_deref(), Some("boom again"));
    }

    #[tokio::test]
    async fn test_fail_without_retry_dead_letters_immediately() {
        let queue = queue().await;
        let task_id = queue
            .enqueue("graph_run", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        queue.dequeue(None, 1).await.unwrap();
        queue.fail(&task_id, "fatal", false).await.unwrap();
        assert_eq!(
            queue.get(&task_id).await.unwrap().unwrap().status,
            TaskStatus::DeadLetter
        );
    }

    #[tokio::test]
    async fn test_heartbeat_only_updates_in_progress() {
        let queue = queue().await;
        let task_id = queue
            .enqueue("graph_run", json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        // Pending: heartbeat is a no-op.
        queue.heartbeat(&task_id).await.unwrap();
        assert!(queue.get(&task_id).await.unwrap().unwrap().heartbeat_at.is_none());

        queue.dequeue(None, 1).await.unwrap();
        queue.heartbeat(&task_id).await.unwrap();
        assert!(queue.get(&task_id).await.unwrap().unwrap().heartbeat_at.is_some());
    }

    #[tokio::test]
    async fn test_stuck_task_detection() {
        let queue = queue().await;
        let task_id = queue
            .enqueue("graph_run", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        queue.dequeue(None, 1).await.unwrap();

        // Fresh heartbeat: not stuck under a 30-minute threshold.
        assert!(queue.stuck_tasks(30).await.unwrap().is_empty());
        // Zero threshold: any heartbeat is stale.
        let stuck = queue.stuck_tasks(0).await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].task_id, task_id);
    }

    #[tokio::test]
    async fn test_revive_from_dead_letter() {
        let queue = queue().await;
        let task_id = queue
            .enqueue("graph_run", json!({"old": true}), EnqueueOptions::default())
            .await
            .unwrap();
        queue.dequeue(None, 1).await.unwrap();
        queue.fail(&task_id, "fatal", false).await.unwrap();

        queue
            .revive(&task_id, Some(json!({"fixed": true})))
            .await
            .unwrap();
        let task = queue.get(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.payload["fixed"], true);
        assert!(task.error.is_none());
    }

    #[tokio::test]
    async fn test_status_counts() {
        let queue = queue().await;
        queue
            .enqueue("graph_run", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        queue
            .enqueue("graph_run", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        queue.dequeue(None, 1).await.unwrap();

        let counts = queue.status_counts().await.unwrap();
        let get = |status: &str| {
            counts
                .iter()
                .find(|(s, _)| s == status)
                .map(|(_, c)| *c)
                .unwrap_or(0)
        };
        assert_eq!(get("pending"), 1);
        assert_eq!(get("in_progress"), 1);
    }
}
