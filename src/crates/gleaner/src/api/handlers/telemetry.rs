//! Admin telemetry handlers.

use crate::api::auth::require_admin_key;
use crate::api::error::ApiResult;
use crate::context::AppContext;
use crate::telemetry::{get_system_state, summarize_state};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// Handler for GET /telemetry/state.
pub async fn state(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_admin_key(&ctx.config, &headers)?;
    Ok(Json(get_system_state(&ctx).await))
}

/// Handler for GET /telemetry/summary.
pub async fn summary(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_admin_key(&ctx.config, &headers)?;
    let snapshot = get_system_state(&ctx).await;
    Ok(Json(json!({"summary": summarize_state(&snapshot)})))
}

/// Handler for GET /telemetry/tasks?limit=N.
pub async fn tasks(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    require_admin_key(&ctx.config, &headers)?;
    let recent = ctx.queue.recent_tasks(query.limit.clamp(1, 500)).await?;
    Ok(Json(json!({
        "count": recent.len(),
        "tasks": recent,
    })))
}
