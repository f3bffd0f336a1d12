//! Telegram webhook: receives chat updates and either enqueues a
//! `graph_run` task (durable mode) or processes the turn inline.

use crate::context::AppContext;
use crate::graph::state::ApprovalDecision;
use crate::queue::durable::EnqueueOptions;
use crate::queue::worker::{run_turn_inline, TASK_TYPE_GRAPH_RUN};
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// One parsed inbound turn.
#[derive(Debug, PartialEq)]
struct InboundTurn {
    chat_id: i64,
    user_input: String,
    approval_decision: Option<ApprovalDecision>,
}

/// Parse a Telegram update: either a text message or an approval callback.
fn parse_update(update: &Value) -> Option<InboundTurn> {
    if let Some(message) = update.get("message") {
        let chat_id = message.get("chat")?.get("id")?.as_i64()?;
        let text = message.get("text")?.as_str()?.to_string();
        return Some(InboundTurn {
            chat_id,
            user_input: text,
            approval_decision: None,
        });
    }

    if let Some(callback) = update.get("callback_query") {
        let chat_id = callback
            .get("message")?
            .get("chat")?
            .get("id")?
            .as_i64()?;
        let data = callback.get("data")?.as_str()?;
        let (decision_label, _diff_id) = data.split_once(':')?;
        let decision = ApprovalDecision::from_label(decision_label)?;
        return Some(InboundTurn {
            chat_id,
            user_input: decision_label.to_string(),
            approval_decision: Some(decision),
        });
    }

    None
}

/// Handler for POST /telegram/webhook.
pub async fn telegram_webhook(
    State(ctx): State<Arc<AppContext>>,
    Json(update): Json<Value>,
) -> Json<Value> {
    let Some(turn) = parse_update(&update) else {
        warn!("Webhook update had no usable message or callback");
        return Json(json!({"ok": true}));
    };
    info!(chat_id = turn.chat_id, "Webhook turn received");

    if ctx.config.use_durable_queue {
        let payload = json!({
            "chat_id": turn.chat_id.to_string(),
            "user_input": turn.user_input,
            "approval_decision": turn.approval_decision,
        });
        match ctx
            .queue
            .enqueue(TASK_TYPE_GRAPH_RUN, payload, EnqueueOptions::default())
            .await
        {
            Ok(task_id) => return Json(json!({"ok": true, "queued": task_id})),
            Err(e) => {
                warn!(error = %e, "Enqueue failed, falling back to inline processing");
            }
        }
    }

    if let Err(e) = run_turn_inline(
        &ctx,
        turn.chat_id,
        &turn.user_input,
        turn.approval_decision,
    )
    .await
    {
        warn!(error = %e, "Inline turn processing failed");
    }
    Json(json!({"ok": true}))
}
