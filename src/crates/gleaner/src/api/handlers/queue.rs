//! Queue administration handlers: dead-letter listing, triage, stuck tasks.

use crate::api::auth::require_admin_key;
use crate::api::error::{ApiError, ApiResult};
use crate::context::AppContext;
use crate::queue::heartbeat::monitor_stuck_tasks;
use crate::queue::triage::{triage_dead_letter_task, TriageAction};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    #[serde(default = "default_dlq_limit")]
    pub limit: i64,
}

fn default_dlq_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct StuckQuery {
    #[serde(default = "default_threshold")]
    pub threshold_minutes: i64,
}

fn default_threshold() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct TriageRequest {
    pub action: String,
    #[serde(default)]
    pub updated_payload: Option<Value>,
}

/// Handler for GET /queue/dead-letter?limit=N.
pub async fn dead_letter(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(query): Query<DeadLetterQuery>,
) -> ApiResult<Json<Value>> {
    require_admin_key(&ctx.config, &headers)?;
    let tasks = ctx.queue.dead_letter_tasks(query.limit.clamp(1, 500)).await?;
    Ok(Json(json!({"count": tasks.len(), "tasks": tasks})))
}

/// Handler for POST /queue/triage/{task_id}.
pub async fn triage(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Json(request): Json<TriageRequest>,
) -> ApiResult<Json<Value>> {
    require_admin_key(&ctx.config, &headers)?;

    let action = match request.action.as_str() {
        "retry" => TriageAction::Retry,
        "update_payload" => TriageAction::UpdatePayload,
        "skip" => TriageAction::Skip,
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown triage action: {}",
                other
            )))
        }
    };

    let result =
        triage_dead_letter_task(&ctx, &task_id, action, request.updated_payload).await?;
    Ok(Json(json!({"success": true, "task_id": result.task_id, "action": request.action})))
}

/// Handler for GET /queue/stuck?threshold_minutes=N.
pub async fn stuck(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(query): Query<StuckQuery>,
) -> ApiResult<Json<Value>> {
    require_admin_key(&ctx.config, &headers)?;
    let tasks = ctx.queue.stuck_tasks(query.threshold_minutes.max(0)).await?;
    // Listing only; the monitor loop owns reclaim decisions.
    let report = monitor_stuck_tasks(&ctx, query.threshold_minutes.max(0), false).await?;
    Ok(Json(json!({
        "stuck_count": report.stuck_count,
        "tasks": tasks,
    })))
}
