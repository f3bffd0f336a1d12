//! Background worker: polls the durable queue and dispatches tasks.
//!
//! `graph_run` tasks drive the supervisor for one conversation turn;
//! `mission_continue` tasks run one autonomous expansion cycle while the
//! user deliberates over a key decision.

use crate::context::AppContext;
use crate::error::Result;
use crate::graph::expansion::run_expansion_cycle;
use crate::graph::run_graph;
use crate::graph::state::{AgentState, ApprovalDecision};
use crate::mission::crucial_decision_label;
use crate::queue::durable::{EnqueueOptions, TaskRecord};
use crate::task_state::ThreadTaskStatus;
use crate::transport::Transport;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const TASK_TYPE_GRAPH_RUN: &str = "graph_run";
pub const TASK_TYPE_MISSION_CONTINUE: &str = "mission_continue";

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn sanitize_error(error: &str) -> String {
    tooling::logging::truncate_for_transport(error, 200)
}

fn chat_id_from_payload(task: &TaskRecord) -> Option<i64> {
    let value = task.payload.get("chat_id")?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Process a single dequeued task to completion or failure.
pub async fn process_one_task(ctx: &Arc<AppContext>, task: &TaskRecord) -> Result<()> {
    // Keep the heartbeat fresh while the task runs.
    let heartbeat = {
        let queue = ctx.queue.clone();
        let task_id = task.task_id.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                if queue.heartbeat(&task_id).await.is_err() {
                    break;
                }
            }
        })
    };

    let outcome = match task.task_type.as_str() {
        TASK_TYPE_MISSION_CONTINUE => process_mission_continue(ctx, task).await,
        _ => process_graph_run(ctx, task).await,
    };

    heartbeat.abort();
    outcome
}

async fn process_mission_continue(ctx: &Arc<AppContext>, task: &TaskRecord) -> Result<()> {
    let Some(chat_id) = chat_id_from_payload(task) else {
        error!(task_id = %task.task_id, "Task missing chat_id in payload");
        ctx.queue
            .fail(&task.task_id, "Missing chat_id in payload", false)
            .await?;
        return Ok(());
    };

    match run_expansion_cycle(ctx).await {
        Ok(summary) => {
            let message = format!(
                "📈 Mission continued while you decide: discovered {} sources across {} domain(s) ({} with primary IDs).",
                summary.total_sources,
                summary.domains_explored.len(),
                summary.with_primary_ids
            );
            if let Err(e) = ctx.transport.send_message(chat_id, &message).await {
                warn!(chat_id, error = %e, "Could not send mission-continue update");
            }
            ctx.queue
                .complete(&task.task_id, Some(serde_json::to_value(&summary)?))
                .await?;
            info!(task_id = %task.task_id, chat_id, "Mission continue completed");
        }
        Err(e) => {
            warn!(task_id = %task.task_id, error = %e, "Mission continue failed");
            ctx.queue
                .fail(&task.task_id, &sanitize_error(&e.to_string()), true)
                .await?;
        }
    }
    Ok(())
}

/// Send the supervisor result to the chat: an approval prompt (with the
/// key-decision label and a background `mission_continue` enqueue) when a
/// decision is pending, otherwise the final response or error.
pub async fn deliver_result(
    ctx: &Arc<AppContext>,
    chat_id: i64,
    result: &AgentState,
) -> Result<()> {
    if result.approval_required && result.diff_id.is_some() {
        let diff_id = result.diff_id.clone().unwrap_or_default();
        let mut text = result
            .final_response
            .clone()
            .unwrap_or_else(|| "Please approve or reject the proposed changes.".to_string());
        if let Some(decision_type) = &result.crucial_decision_type {
            text = format!(
                "🔑 Key decision: {}\n\n{}",
                crucial_decision_label(decision_type),
                text
            );
        }
        ctx.transport
            .send_approval_prompt(chat_id, &text, &diff_id)
            .await?;

        // Background expansion proceeds while the user deliberates.
        if let Err(e) = ctx
            .queue
            .enqueue(
                TASK_TYPE_MISSION_CONTINUE,
                json!({"chat_id": chat_id.to_string()}),
                EnqueueOptions::default(),
            )
            .await
        {
            warn!(error = %e, "Could not enqueue mission_continue");
        }
    } else if let Some(response) = &result.final_response {
        ctx.transport.send_message(chat_id, response).await?;
    } else if let Some(error) = &result.error {
        ctx.transport
            .send_message(chat_id, &format!("❌ Error: {}", sanitize_error(error)))
            .await?;
    } else {
        ctx.transport
            .send_message(chat_id, "Processing complete.")
            .await?;
    }
    Ok(())
}

/// Run one user turn inline (no queue) and deliver the result.
pub async fn run_turn_inline(
    ctx: &Arc<AppContext>,
    chat_id: i64,
    user_input: &str,
    approval_decision: Option<ApprovalDecision>,
) -> Result<()> {
    let thread_id = chat_id.to_string();
    let mut state = AgentState::for_turn(&thread_id, user_input);
    state.approval_decision = approval_decision;

    ctx.task_states
        .set_status(&thread_id, ThreadTaskStatus::InProgress, Some("supervisor"), None);
    match run_graph(ctx, state, &thread_id).await {
        Ok(result) => {
            ctx.task_states.set_status(
                &thread_id,
                ThreadTaskStatus::Completed,
                Some("supervisor"),
                None,
            );
            deliver_result(ctx, chat_id, &result).await
        }
        Err(e) => {
            let message = sanitize_error(&e.to_string());
            ctx.task_states.set_status(
                &thread_id,
                ThreadTaskStatus::Failed,
                Some("supervisor"),
                Some(&message),
            );
            ctx.transport
                .send_message(chat_id, &format!("❌ Error processing command: {}", message))
                .await
        }
    }
}

async fn process_graph_run(ctx: &Arc<AppContext>, task: &TaskRecord) -> Result<()> {
    let Some(chat_id) = chat_id_from_payload(task) else {
        error!(task_id = %task.task_id, "Task missing chat_id in payload");
        ctx.queue
            .fail(&task.task_id, "Missing chat_id in payload", false)
            .await?;
        return Ok(());
    };
    let thread_id = chat_id.to_string();

    let mut state = AgentState::for_turn(
        &thread_id,
        task.payload
            .get("user_input")
            .and_then(|v| v.as_str())
            .unwrap_or_default(),
    );
    state.approval_decision = task
        .payload
        .get("approval_decision")
        .and_then(|v| v.as_str())
        .and_then(ApprovalDecision::from_label);

    ctx.task_states
        .set_status(&thread_id, ThreadTaskStatus::InProgress, Some("supervisor"), None);

    match run_graph(ctx, state, &thread_id).await {
        Ok(result) => {
            ctx.task_states.set_status(
                &thread_id,
                ThreadTaskStatus::Completed,
                Some("supervisor"),
                None,
            );

            deliver_result(ctx, chat_id, &result).await?;

            ctx.queue
                .complete(
                    &task.task_id,
                    Some(json!({
                        "final_response": result.final_response,
                        "error": result.error,
                    })),
                )
                .await?;
            info!(task_id = %task.task_id, chat_id, "Task completed");
        }
        Err(e) => {
            let message = sanitize_error(&e.to_string());
            ctx.task_states.set_status(
                &thread_id,
                ThreadTaskStatus::Failed,
                Some("supervisor"),
                Some(&message),
            );
            error!(task_id = %task.task_id, error = %e, "Task failed");
            if let Err(send_err) = ctx
                .transport
                .send_message(chat_id, &format!("❌ Error processing command: {}", message))
                .await
            {
                error!(error = %send_err, "Failed to send error message");
            }
            ctx.queue.fail(&task.task_id, &message, true).await?;
        }
    }
    Ok(())
}

/// Poll loop: dequeue one task at a time and process it. Runs until the
/// task owning it is aborted.
pub async fn run_worker_loop(ctx: Arc<AppContext>, task_type: Option<String>) {
    info!(task_type = task_type.as_deref().unwrap_or("any"), "Worker started");
    loop {
        match ctx.queue.dequeue(task_type.as_deref(), 1).await {
            Ok(tasks) if !tasks.is_empty() => {
                for task in &tasks {
                    if let Err(e) = process_one_task(&ctx, task).await {
                        error!(task_id = %task.task_id, error = %e, "Worker error processing task");
                    }
                }
            }
            Ok(_) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                error!(error = %e, "Worker dequeue error");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}
