//! The supervisor state machine.
//!
//! One compiled routing table drives every conversation turn: detect the
//! intent (keyword-first, model fallback constrained to the enum), run the
//! matching pipeline, gate writes behind approval, and persist the merged
//! state to the checkpoint store after every node. A recursion cap bounds
//! traversal depth.

use crate::context::AppContext;
use crate::error::{GleanerError, Result};
use crate::graph::agents::{
    content_fetcher_node, domain_scout_node, parallel_agents_node, source_gatherer_node,
};
use crate::graph::nodes::{
    cancel_node, commit_node, extractor_node, handle_reject_node, help_node, query_node,
    status_node, writer_node,
};
use crate::graph::state::{AgentState, ApprovalDecision, Intent, StateUpdate};
use crate::model::ModelScope;
use crate::security::wrap_untrusted_content;
use crate::validation::validate_state_update;
use llm::ChatRequest;
use tracing::{info, warn};

/// The supervisor's nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphNode {
    DetectIntent,
    Help,
    Status,
    Cancel,
    Extract,
    Link,
    Write,
    WaitForApproval,
    Commit,
    HandleReject,
    Query,
    GatherSources,
    FetchContent,
    ScoutDomains,
    ParallelTest,
    Improve,
    End,
}

const CLARIFICATION_PROMPT: &str = "🤔 I did not understand that. Try /help for the \
     command list, e.g. /ingest topic=photosynthesis or /gather sources for Algebra.";

/// Keyword-first intent detection with a model fallback constrained to the
/// intent enum.
pub async fn detect_intent(ctx: &AppContext, user_input: &str) -> Intent {
    let input = user_input.trim().to_lowercase();
    if input.is_empty() {
        return Intent::Unknown;
    }

    if input.starts_with("/help") {
        return Intent::Help;
    }
    if input.starts_with("/status") {
        return Intent::Status;
    }
    if input.starts_with("/cancel") {
        return Intent::Cancel;
    }
    if input.starts_with("/gather")
        || input.contains("gather sources")
        || input.contains("find sources")
    {
        return Intent::GatherSources;
    }
    if input.starts_with("/fetch") || input.contains("fetch content") {
        return Intent::FetchContent;
    }
    if input.starts_with("/scout")
        || input.contains("scout domains")
        || input.contains("find new domains")
    {
        return Intent::ScoutDomains;
    }
    if input.starts_with("/test") || input.contains("test agents") || input.contains("parallel") {
        return Intent::ParallelTest;
    }
    if input.starts_with("/improve") || input.contains("improve") {
        return Intent::Improve;
    }
    if input.starts_with("/query") || input.contains("query") {
        return Intent::Query;
    }
    if input.starts_with("/ingest") || input.contains("ingest") || input.contains("topic=") {
        return Intent::Ingest;
    }

    // Model fallback, constrained to the enum; anything else is Unknown.
    if let Some(model) = ctx.model_for_task("intent_detection", ModelScope::agent("supervisor")) {
        let prompt = format!(
            "Classify the user message into exactly one intent label out of: ingest, query, \
             gather_sources, fetch_content, scout_domains, parallel_test, improve, help, \
             status, cancel, unknown. Reply with the label only.\n\n{}",
            wrap_untrusted_content(user_input, 2000)
        );
        if let Ok(response) = model.invoke(ChatRequest::user(prompt)).await {
            if let Some(intent) = Intent::from_label(response.content.trim()) {
                return intent;
            }
        }
    }

    Intent::Unknown
}

fn entry_node(state: &AgentState) -> GraphNode {
    // A decision on a pending approval re-enters the approval flow directly.
    if state.approval_required {
        match state.approval_decision {
            Some(ApprovalDecision::Approve) => return GraphNode::Commit,
            Some(ApprovalDecision::Reject) => return GraphNode::HandleReject,
            None => {}
        }
    }
    GraphNode::DetectIntent
}

fn route_after_intent(state: &AgentState) -> GraphNode {
    match state.intent {
        Some(Intent::Help) => GraphNode::Help,
        Some(Intent::Status) => GraphNode::Status,
        Some(Intent::Cancel) => GraphNode::Cancel,
        Some(Intent::GatherSources) => GraphNode::GatherSources,
        Some(Intent::FetchContent) => GraphNode::FetchContent,
        Some(Intent::ScoutDomains) => GraphNode::ScoutDomains,
        Some(Intent::ParallelTest) => GraphNode::ParallelTest,
        Some(Intent::Improve) => GraphNode::Improve,
        Some(Intent::Query) => GraphNode::Query,
        Some(Intent::Ingest) => GraphNode::Extract,
        Some(Intent::Unknown) | None => GraphNode::End,
    }
}

fn route_after_write(state: &AgentState) -> GraphNode {
    if state.error.is_some() {
        return GraphNode::End;
    }
    if state.approval_required {
        match state.approval_decision {
            None => GraphNode::WaitForApproval,
            Some(ApprovalDecision::Approve) => GraphNode::Commit,
            Some(ApprovalDecision::Reject) => GraphNode::HandleReject,
        }
    } else {
        GraphNode::End
    }
}

/// Run one supervisor turn for a thread: load the checkpoint, merge the
/// turn's inputs, traverse the graph, and persist state after every node.
pub async fn run_graph(
    ctx: &AppContext,
    input: AgentState,
    thread_id: &str,
) -> Result<AgentState> {
    // Resume from the thread's checkpoint when one exists.
    let mut state = match ctx.checkpoints.load(thread_id).await {
        Ok(Some(checkpoint)) => checkpoint,
        Ok(None) => AgentState::default(),
        Err(e) => {
            warn!(thread_id = %thread_id, error = %e, "Checkpoint load failed, starting fresh");
            AgentState::default()
        }
    };

    // Merge this turn's inputs over the checkpointed state.
    state.chat_id = input.chat_id.clone();
    state.user_input = input.user_input.clone();
    state.final_response = None;
    state.error = None;
    if input.approval_decision.is_some() {
        state.approval_decision = input.approval_decision;
    }
    if input.intent.is_some() {
        state.intent = input.intent;
    }

    let mut node = entry_node(&state);
    let mut steps = 0usize;

    while node != GraphNode::End {
        steps += 1;
        if steps > ctx.config.recursion_limit {
            warn!(
                thread_id = %thread_id,
                limit = ctx.config.recursion_limit,
                "Recursion limit reached, aborting traversal"
            );
            state.error = Some(format!(
                "Recursion limit ({}) reached",
                ctx.config.recursion_limit
            ));
            state.final_response =
                Some("❌ Processing took too many steps and was aborted.".to_string());
            break;
        }

        info!(thread_id = %thread_id, node = ?node, step = steps, "Supervisor step");

        let result: Result<StateUpdate> = match node {
            GraphNode::DetectIntent => {
                let user_input = state.user_input.clone().unwrap_or_default();
                let intent = detect_intent(ctx, &user_input).await;
                let mut update = StateUpdate {
                    intent: Some(intent),
                    ..StateUpdate::default()
                };
                if intent == Intent::Unknown {
                    update.final_response = Some(CLARIFICATION_PROMPT.to_string());
                }
                Ok(update)
            }
            GraphNode::Help => Ok(help_node()),
            GraphNode::Status => Ok(status_node(&state)),
            GraphNode::Cancel => Ok(cancel_node()),
            GraphNode::Extract => extractor_node(ctx, &state).await,
            GraphNode::Link => crate::graph::nodes::linker_node(ctx, &state).await,
            GraphNode::Write => writer_node(ctx, &state).await,
            // The graph stops here; the transport shows the approval UI.
            GraphNode::WaitForApproval => Ok(StateUpdate::default()),
            GraphNode::Commit => commit_node(ctx, &state).await,
            GraphNode::HandleReject => Ok(handle_reject_node(&state)),
            GraphNode::Query => query_node(ctx, &state).await,
            GraphNode::GatherSources => source_gatherer_node(ctx, &state).await,
            GraphNode::FetchContent => content_fetcher_node(ctx, &state).await,
            GraphNode::ScoutDomains => domain_scout_node(ctx, &state).await,
            GraphNode::ParallelTest => parallel_agents_node(ctx, &state).await,
            GraphNode::Improve => {
                crate::graph::improvement::improvement_agent_node(ctx, &state).await
            }
            GraphNode::End => unreachable!(),
        };

        match result {
            Ok(update) => {
                let update = validate_state_update(&update)?;
                update.merge_into(&mut state);
            }
            Err(e) => {
                // Drop the node's output, keep prior state, surface the
                // failure. Budget and validation errors are not retried.
                warn!(thread_id = %thread_id, node = ?node, error = %e, "Node failed");
                state.error = Some(tooling::logging::truncate_for_log(&e.to_string()));
                state.final_response = Some(user_facing_error(&e));
                ctx.checkpoints.save(thread_id, &state).await?;
                return Ok(state);
            }
        }

        // Every node writes back the merged state.
        ctx.checkpoints.save(thread_id, &state).await?;

        node = match node {
            GraphNode::DetectIntent => route_after_intent(&state),
            GraphNode::Extract => GraphNode::Link,
            GraphNode::Link => GraphNode::Write,
            // Write and Improve both gate behind approval.
            GraphNode::Write | GraphNode::Improve => route_after_write(&state),
            GraphNode::WaitForApproval => GraphNode::End,
            _ => GraphNode::End,
        };
    }

    ctx.checkpoints.save(thread_id, &state).await?;
    Ok(state)
}

fn user_facing_error(error: &GleanerError) -> String {
    let message = match error {
        GleanerError::BudgetExceeded(reason) => format!("💸 Budget limit hit: {}", reason),
        GleanerError::CircuitOpen(reason) => format!("⏸️ {}", reason),
        GleanerError::Validation(reason) => format!("❌ Output failed validation: {}", reason),
        other => format!("❌ Error: {}", other),
    };
    tooling::logging::truncate_for_transport(&message, 200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{test_context, test_context_with_config};

    #[tokio::test]
    async fn test_keyword_intents() {
        let tc = test_context(vec![]).await;
        assert_eq!(detect_intent(&tc.ctx, "/help").await, Intent::Help);
        assert_eq!(detect_intent(&tc.ctx, "/status now").await, Intent::Status);
        assert_eq!(
            detect_intent(&tc.ctx, "gather sources for Algebra").await,
            Intent::GatherSources
        );
        assert_eq!(
            detect_intent(&tc.ctx, "/ingest topic=water").await,
            Intent::Ingest
        );
        assert_eq!(detect_intent(&tc.ctx, "").await, Intent::Unknown);
    }

    #[tokio::test]
    async fn test_model_fallback_constrained_to_enum() {
        let tc = test_context(vec!["scout_domains"]).await;
        assert_eq!(
            detect_intent(&tc.ctx, "look around please").await,
            Intent::ScoutDomains
        );

        let tc = test_context(vec!["definitely_not_a_label"]).await;
        assert_eq!(
            detect_intent(&tc.ctx, "look around please").await,
            Intent::Unknown
        );
    }

    #[tokio::test]
    async fn test_unknown_input_gets_clarification() {
        let tc = test_context(vec!["unknown"]).await;
        let state = AgentState::for_turn("42", "mumble mumble");
        let result = run_graph(&tc.ctx, state, "42").await.unwrap();
        assert!(result.final_response.unwrap().contains("/help"));
    }

    #[tokio::test]
    async fn test_help_flow_checkpoints_state() {
        let tc = test_context(vec![]).await;
        let state = AgentState::for_turn("42", "/help");
        let result = run_graph(&tc.ctx, state, "42").await.unwrap();
        assert!(result.final_response.unwrap().contains("/ingest"));

        let checkpoint = tc.ctx.checkpoints.load("42").await.unwrap().unwrap();
        assert_eq!(checkpoint.intent, Some(Intent::Help));
    }

    #[tokio::test]
    async fn test_ingest_stops_at_approval_gate() {
        let tc = test_context(vec![
            r#"{"entities": [{"id": "C:temp_1", "label": "Concept",
                "properties": {"name": "photosynthesis", "domain": "biology"}}],
               "relations": [], "claims": []}"#,
        ])
        .await;

        let state = AgentState::for_turn("42", "/ingest topic=photosynthesis");
        let result = run_graph(&tc.ctx, state, "42").await.unwrap();

        assert!(result.approval_required);
        assert!(result.diff_id.is_some());
        assert!(result.proposed_diff.is_some());
        assert_eq!(result.crucial_decision_type.as_deref(), Some("kg_write"));
        assert!(result.final_response.unwrap().contains("+1 nodes"));
        // Nothing committed yet.
        assert_eq!(tc.ctx.changelog.current_version().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_approval_reentry_commits() {
        let tc = test_context(vec![
            r#"{"entities": [{"id": "C:temp_1", "label": "Concept",
                "properties": {"name": "photosynthesis", "domain": "biology"}}],
               "relations": [], "claims": []}"#,
        ])
        .await;

        let first = run_graph(
            &tc.ctx,
            AgentState::for_turn("42", "/ingest topic=photosynthesis"),
            "42",
        )
        .await
        .unwrap();
        assert!(first.approval_required);

        // Second turn carries the decision; supervisor re-enters at commit.
        let mut decision_turn = AgentState::for_turn("42", "approve");
        decision_turn.approval_decision = Some(ApprovalDecision::Approve);
        let second = run_graph(&tc.ctx, decision_turn, "42").await.unwrap();

        let response = second.final_response.unwrap();
        assert!(response.contains("✅ Committed"), "got: {}", response);
        assert!(!second.approval_required);
        assert!(second.proposed_diff.is_none());
        assert_eq!(tc.ctx.changelog.current_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejection_reentry_drops_diff() {
        let tc = test_context(vec![
            r#"{"entities": [{"id": "C:temp_1", "label": "Concept",
                "properties": {"name": "x", "domain": "general"}}],
               "relations": [], "claims": []}"#,
        ])
        .await;

        run_graph(&tc.ctx, AgentState::for_turn("42", "/ingest topic=x"), "42")
            .await
            .unwrap();

        let mut decision_turn = AgentState::for_turn("42", "reject");
        decision_turn.approval_decision = Some(ApprovalDecision::Reject);
        let result = run_graph(&tc.ctx, decision_turn, "42").await.unwrap();

        assert!(result.final_response.unwrap().contains("rejected"));
        assert!(result.proposed_diff.is_none());
        assert_eq!(tc.ctx.changelog.current_version().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_clears_pending_diff() {
        let tc = test_context(vec![
            r#"{"entities": [{"id": "C:temp_1", "label": "Concept",
                "properties": {"name": "x", "domain": "general"}}],
               "relations": [], "claims": []}"#,
        ])
        .await;

        run_graph(&tc.ctx, AgentState::for_turn("42", "/ingest topic=x"), "42")
            .await
            .unwrap();
        let result = run_graph(&tc.ctx, AgentState::for_turn("42", "/cancel"), "42")
            .await
            .unwrap();

        assert!(result.final_response.unwrap().contains("cancelled"));
        assert!(result.proposed_diff.is_none());
        assert!(!result.approval_required);
    }

    #[tokio::test]
    async fn test_improve_flow_gates_then_applies() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::Config {
            improvement_root: dir.path().to_string_lossy().to_string(),
            ..crate::config::Config::default()
        };
        let tc = test_context_with_config(
            vec![
                r#"{"understanding": "Add better logging",
                    "files_to_modify": ["src/demo.rs"],
                    "files_to_read": [], "plan": ["Step 1: add tracing"],
                    "risk_level": "low"}"#,
                "```rust\nfn improved() {}\n```",
            ],
            config,
        )
        .await;

        let first = run_graph(
            &tc.ctx,
            AgentState::for_turn("42", "/improve add better logging"),
            "42",
        )
        .await
        .unwrap();
        assert!(first.approval_required);
        assert_eq!(first.crucial_decision_type.as_deref(), Some("code_change"));
        assert!(first.diff_id.as_deref().unwrap().starts_with("improve-"));
        assert!(first.proposed_changes.is_some());

        let mut decision = AgentState::for_turn("42", "approve");
        decision.approval_decision = Some(ApprovalDecision::Approve);
        let second = run_graph(&tc.ctx, decision, "42").await.unwrap();

        assert!(second
            .final_response
            .unwrap()
            .contains("Improvements applied"));
        assert!(second.proposed_changes.is_none());
        assert!(!second.approval_required);
        let written = std::fs::read_to_string(dir.path().join("src/demo.rs")).unwrap();
        assert_eq!(written, "fn improved() {}");
    }

    #[tokio::test]
    async fn test_budget_error_surfaces_to_user() {
        let config = crate::config::Config {
            llm_daily_budget_usd: Some(0.0),
            ..crate::config::Config::default()
        };
        let tc = test_context_with_config(vec!["irrelevant"], config).await;

        let result = run_graph(
            &tc.ctx,
            AgentState::for_turn("42", "/ingest topic=expensive"),
            "42",
        )
        .await
        .unwrap();

        assert!(result.error.is_some());
        assert!(result.final_response.unwrap().contains("Budget"));
    }

    #[tokio::test]
    async fn test_recursion_limit_enforced() {
        let config = crate::config::Config {
            recursion_limit: 1,
            ..crate::config::Config::default()
        };
        let tc = test_context_with_config(vec![], config).await;

        // /help needs two steps (detect_intent, help), so the cap of one
        // trips after intent detection.
        let result = run_graph(&tc.ctx, AgentState::for_turn("42", "/help"), "42")
            .await
            .unwrap();
        assert!(result.error.unwrap().contains("Recursion limit"));
    }
}
