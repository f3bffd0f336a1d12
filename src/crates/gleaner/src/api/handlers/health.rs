//! Liveness and diagnostics handlers.

use crate::context::AppContext;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for GET /.
pub async fn root() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Handler for GET /health.
pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let database = match ctx.db.health_check().await {
        Ok(()) => "connected",
        Err(_) => "error",
    };
    Json(json!({"status": "healthy", "database": database}))
}

/// Handler for GET /diagnostics/recursion.
pub async fn diagnostics_recursion(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "recursion_limit": ctx.config.recursion_limit,
        "source": "SUPERVISOR_RECURSION_LIMIT",
    }))
}
