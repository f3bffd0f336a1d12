//! KG changelog and rollback handlers.

use crate::api::auth::require_admin_key;
use crate::api::error::{ApiError, ApiResult};
use crate::api::handlers::telemetry::LimitQuery;
use crate::context::AppContext;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for GET /kg/versions?limit=N.
pub async fn list_versions(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    require_admin_key(&ctx.config, &headers)?;
    let current = ctx.changelog.current_version().await?;
    let versions = ctx.changelog.list_versions(query.limit.clamp(1, 200)).await?;
    Ok(Json(json!({
        "current_version": current,
        "count": versions.len(),
        "versions": versions,
    })))
}

/// Handler for GET /kg/versions/{version}.
pub async fn get_version(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(version): Path<i64>,
) -> ApiResult<Json<Value>> {
    require_admin_key(&ctx.config, &headers)?;
    let entry = ctx
        .changelog
        .get_version(version)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Version {} not found", version)))?;
    Ok(Json(serde_json::to_value(entry).map_err(|e| {
        ApiError::Internal(format!("Serialization failed: {}", e))
    })?))
}

/// Handler for POST /kg/rollback/{version}.
pub async fn rollback(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(version): Path<i64>,
) -> ApiResult<Json<Value>> {
    require_admin_key(&ctx.config, &headers)?;
    let outcome = ctx.changelog.rollback_to(ctx.store.as_ref(), version).await?;
    Ok(Json(json!({
        "success": true,
        "from_version": outcome.from_version,
        "to_version": outcome.to_version,
        "new_version": outcome.new_version,
        "result": outcome.apply_result,
    })))
}
