//! API route definitions.

use crate::context::AppContext;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;

/// Build the complete router over the shared context.
pub fn create_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Liveness
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route(
            "/diagnostics/recursion",
            get(handlers::health::diagnostics_recursion),
        )
        // Transport webhook
        .route("/telegram/webhook", post(handlers::webhook::telegram_webhook))
        // Telemetry (admin)
        .route("/telemetry/state", get(handlers::telemetry::state))
        .route("/telemetry/summary", get(handlers::telemetry::summary))
        .route("/telemetry/tasks", get(handlers::telemetry::tasks))
        // KG changelog & rollback (admin)
        .route("/kg/versions", get(handlers::kg::list_versions))
        .route("/kg/versions/:version", get(handlers::kg::get_version))
        .route("/kg/rollback/:version", post(handlers::kg::rollback))
        // Queue administration (admin)
        .route("/queue/dead-letter", get(handlers::queue::dead_letter))
        .route("/queue/triage/:task_id", post(handlers::queue::triage))
        .route("/queue/stuck", get(handlers::queue::stuck))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
