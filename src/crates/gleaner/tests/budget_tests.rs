//! Budget cap enforcement across the tracked model client, breakers, and
//! the user-facing gather flow.

use gleaner::config::Config;
use gleaner::context::testing::test_context_with_config;
use gleaner::cost::tracker::CallScope;
use gleaner::error::GleanerError;
use gleaner::graph::state::AgentState;
use gleaner::model::ModelScope;
use llm::ChatRequest;

fn capped_config(limit: f64) -> Config {
    Config {
        llm_daily_budget_usd: Some(limit),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_budget_trip_opens_domain_breaker() {
    let tc = test_context_with_config(vec!["never used"], capped_config(0.01)).await;

    // One prior call consumed $0.008 of the $0.01 daily budget.
    tc.ctx.tracker.record_call(
        "unknown-model", // default pricing: $1 per 1M input tokens
        "openai",
        8_000,
        0,
        &CallScope {
            domain: Some("Algebra".to_string()),
            queue: None,
            agent: None,
        },
        0.0,
        true,
        None,
    );

    // The next call's pre-check estimate breaks the cap.
    let model = tc
        .ctx
        .model_for_task(
            "extraction",
            ModelScope::agent("extractor").with_domain(Some("Algebra")),
        )
        .unwrap();
    let big_prompt = "x".repeat(400_000); // ~100k tokens estimated
    let err = model.invoke(ChatRequest::user(big_prompt)).await.unwrap_err();
    assert!(matches!(err, GleanerError::BudgetExceeded(_)));
    assert!(err.to_string().contains("Global daily budget exceeded"));

    // The model was never invoked and the domain breaker is now open.
    assert_eq!(tc.mock.call_count(), 0);
    assert!(!tc.ctx.breakers.allow_domain("Algebra"));
}

#[tokio::test]
async fn test_paused_domain_surfaces_in_gather_flow() {
    let tc = test_context_with_config(vec![], capped_config(0.01)).await;
    tc.ctx.breakers.pause_domain("Algebra");

    let result = gleaner::graph::run_graph(
        &tc.ctx,
        AgentState::for_turn("42", "gather sources for Algebra"),
        "42",
    )
    .await
    .unwrap();

    let response = result.final_response.unwrap();
    assert!(response.contains("paused"));
    assert!(response.contains("Algebra"));
}

#[tokio::test]
async fn test_within_budget_calls_proceed() {
    let tc = test_context_with_config(vec!["fine"], capped_config(10.0)).await;
    let model = tc
        .ctx
        .model_for_task("triage", ModelScope::agent("supervisor"))
        .unwrap();
    let response = model.invoke(ChatRequest::user("small prompt")).await.unwrap();
    assert_eq!(response.content, "fine");
    assert_eq!(tc.ctx.tracker.stats().total_calls, 1);
}

#[tokio::test]
async fn test_envelope_denial_blocks_before_hard_caps() {
    let config = Config {
        cost_per_tool_call_cap_usd: Some(0.000001),
        ..Config::default()
    };
    let tc = test_context_with_config(vec!["never"], config).await;

    let model = tc
        .ctx
        .model_for_task("extraction", ModelScope::agent("extractor"))
        .unwrap();
    let err = model
        .invoke(ChatRequest::user("a".repeat(100_000)))
        .await
        .unwrap_err();
    assert!(matches!(err, GleanerError::BudgetExceeded(_)));
    assert!(err.to_string().contains("Per-call budget envelope"));
    assert_eq!(tc.mock.call_count(), 0);
}
