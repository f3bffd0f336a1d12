//! Dead-letter queue triage: manual review and retry of failed tasks.

use crate::context::AppContext;
use crate::error::{GleanerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Triage actions on a dead-letter task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageAction {
    Retry,
    UpdatePayload,
    Skip,
}

/// Result of a triage operation.
#[derive(Debug, Clone, Serialize)]
pub struct TriageResult {
    pub task_id: String,
    pub action: TriageAction,
}

/// Apply a triage action to a task in the dead-letter queue.
pub async fn triage_dead_letter_task(
    ctx: &AppContext,
    task_id: &str,
    action: TriageAction,
    updated_payload: Option<Value>,
) -> Result<TriageResult> {
    let dlq = ctx.queue.dead_letter_tasks(1000).await?;
    if !dlq.iter().any(|t| t.task_id == task_id) {
        return Err(GleanerError::NotFound(format!(
            "Task {} not found in dead-letter queue",
            task_id
        )));
    }

    match action {
        TriageAction::Retry => {
            ctx.queue.revive(task_id, None).await?;
            info!(task_id = %task_id, "Task moved from DLQ to pending for retry");
        }
        TriageAction::UpdatePayload => {
            let payload = updated_payload.ok_or_else(|| {
                GleanerError::Validation("update_payload requires updated_payload".to_string())
            })?;
            ctx.queue.revive(task_id, Some(payload)).await?;
            info!(task_id = %task_id, "Task payload updated, moved to pending");
        }
        TriageAction::Skip => {
            info!(task_id = %task_id, "Task left in DLQ (skipped)");
        }
    }

    Ok(TriageResult {
        task_id: task_id.to_string(),
        action,
    })
}
