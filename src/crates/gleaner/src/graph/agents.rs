//! Discovery-side agent nodes: source gatherer, content fetcher, domain
//! scout, and the parallel test harness.

use crate::context::AppContext;
use crate::error::Result;
use crate::graph::state::{AgentState, StateUpdate};
use crate::model::ModelScope;
use crate::security::wrap_untrusted_content;
use crate::sources::discovery::discover_sources_for_domain;
use crate::sources::fetcher::gather_domain_content;
use crate::validation::{validate_fetch_intent, FetchIntent};
use llm::ChatRequest;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Content length fetched per source.
const FETCH_MAX_LENGTH: usize = 10_000;

/// Parse the domain out of "gather sources for <domain>" style commands.
fn domain_from_input(user_input: &str) -> Option<String> {
    let lower = user_input.to_lowercase();
    let idx = lower.find(" for ")?;
    let domain = user_input[idx + 5..].trim();
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_string())
    }
}

/// Discover and rank sources for the requested domain.
pub async fn source_gatherer_node(ctx: &AppContext, state: &AgentState) -> Result<StateUpdate> {
    let user_input = state.user_input.clone().unwrap_or_default();
    let Some(domain) = domain_from_input(&user_input) else {
        return Ok(StateUpdate::respond(
            "❌ Please name a domain. Example: /gather sources for Algebra",
        ));
    };

    // A paused domain is surfaced, not silently skipped.
    if !ctx.breakers.allow_domain(&domain) {
        return Ok(StateUpdate::respond(format!(
            "⏸️ Domain '{}' is paused (circuit breaker). Resume it or try later.",
            domain
        )));
    }

    let query_model = ctx.model_for_task(
        "query_generation",
        ModelScope::agent("source_gatherer").with_domain(Some(&domain)),
    );
    let outcome = discover_sources_for_domain(
        ctx.providers.as_ref(),
        &ctx.limiter,
        &ctx.breakers,
        query_model.as_ref(),
        &domain,
        20,
        None,
        None,
    )
    .await?;

    let mut lines = vec![format!(
        "🔎 Sources for {} ({} found, {} returned):\n",
        domain, outcome.statistics.total_discovered, outcome.statistics.returned
    )];
    for (i, source) in outcome.sources.iter().take(10).enumerate() {
        lines.push(format!(
            "{}. {} [{}] quality {:.2}, {} cost, priority {:.2}",
            i + 1,
            source.title,
            source.source_type,
            source.quality_score,
            source.cost_tier,
            source.priority_score,
        ));
    }
    if !outcome.recommendations.is_empty() {
        lines.push(String::new());
        for recommendation in &outcome.recommendations {
            lines.push(format!("💡 {}", recommendation));
        }
    }

    let mut notes = Map::new();
    notes.insert(
        "discovered_sources".to_string(),
        json!({
            "domains": [domain],
            "sources_by_domain": {domain.clone(): outcome.sources},
            "statistics": outcome.statistics,
        }),
    );

    info!(domain = %domain, returned = outcome.sources.len(), "Source gathering complete");
    Ok(StateUpdate {
        working_notes: Some(notes),
        final_response: Some(lines.join("\n")),
        ..StateUpdate::default()
    })
}

/// Parse the fetch request, model-assisted when possible.
async fn parse_fetch_request(ctx: &AppContext, user_input: &str) -> FetchIntent {
    if let Some(model) = ctx.model_for_task(
        "classification",
        ModelScope::agent("content_fetcher"),
    ) {
        let prompt = format!(
            "Parse this content-fetch request. Respond with ONLY a JSON object of the form \
             {{\"domains\": [\"...\"], \"max_sources\": 10, \"min_priority\": 0.0}}.\n\n{}",
            wrap_untrusted_content(user_input, 2000)
        );
        if let Ok(response) = model.invoke(ChatRequest::user(prompt)).await {
            let trimmed = response.content.trim();
            let candidate = trimmed
                .find('{')
                .and_then(|start| trimmed.rfind('}').map(|end| &trimmed[start..=end]));
            if let Some(fragment) = candidate {
                if let Ok(parsed) = serde_json::from_str::<Value>(fragment) {
                    if let Ok(intent) = validate_fetch_intent(&parsed) {
                        if !intent.domains.is_empty() {
                            return intent;
                        }
                    }
                }
            }
        }
        warn!("Fetch-request parse failed, falling back to keyword parse");
    }

    // Deterministic fallback: "fetch content for <domain>".
    let domains = domain_from_input(user_input)
        .map(|d| vec![d])
        .unwrap_or_default();
    validate_fetch_intent(&json!({"domains": domains})).unwrap_or(FetchIntent {
        domains: Vec::new(),
        max_sources: 10,
        min_priority: 0.0,
    })
}

/// Fetch content from previously discovered (or freshly discovered)
/// sources for the requested domains.
pub async fn content_fetcher_node(ctx: &AppContext, state: &AgentState) -> Result<StateUpdate> {
    let user_input = state.user_input.clone().unwrap_or_default();
    let intent = parse_fetch_request(ctx, &user_input).await;

    if intent.domains.is_empty() {
        return Ok(StateUpdate::respond(
            "❌ Please name a domain. Example: /fetch content for Algebra",
        ));
    }

    let mut responses = Vec::new();
    let mut fetched_notes = Map::new();

    for domain in &intent.domains {
        // Reuse sources discovered earlier in this conversation when present.
        let previous: Vec<crate::sources::providers::SourceCandidate> = state
            .working_notes
            .get("discovered_sources")
            .and_then(|ds| ds.get("sources_by_domain"))
            .and_then(|by| by.get(domain))
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let sources = if previous.is_empty() {
            discover_sources_for_domain(
                ctx.providers.as_ref(),
                &ctx.limiter,
                &ctx.breakers,
                None,
                domain,
                intent.max_sources,
                None,
                None,
            )
            .await?
            .sources
        } else {
            previous
        };

        let outcome = gather_domain_content(
            &ctx.http,
            &ctx.allowlist,
            &ctx.cache,
            sources,
            domain,
            intent.max_sources,
            intent.min_priority,
            FETCH_MAX_LENGTH,
        )
        .await;

        responses.push(format!(
            "📥 {}: fetched {}/{} sources ({} chars)",
            domain,
            outcome.statistics.successful_fetches,
            outcome.statistics.total_sources,
            outcome.statistics.total_content_length
        ));
        for recommendation in &outcome.recommendations {
            responses.push(format!("💡 {}", recommendation));
        }
        fetched_notes.insert(domain.clone(), serde_json::to_value(&outcome.statistics)?);
    }

    let mut notes = Map::new();
    notes.insert("fetched_content".to_string(), Value::Object(fetched_notes));
    Ok(StateUpdate {
        working_notes: Some(notes),
        final_response: Some(responses.join("\n")),
        ..StateUpdate::default()
    })
}

/// Candidate domains proposed when no model is available.
const SCOUT_FALLBACK_DOMAINS: &[&str] = &[
    "Graph Theory",
    "Linear Algebra",
    "Organic Chemistry",
    "Microeconomics",
    "World History",
];

/// Propose new domains worth expanding into.
pub async fn domain_scout_node(ctx: &AppContext, state: &AgentState) -> Result<StateUpdate> {
    let user_input = state.user_input.clone().unwrap_or_default();

    let proposals: Vec<String> = match ctx.model_for_task(
        "domain_scouting",
        ModelScope::agent("domain_scout"),
    ) {
        Some(model) => {
            let prompt = format!(
                "Propose 5 knowledge domains adjacent to the user's interests that a \
                 knowledge graph should expand into next. Respond with a JSON array of \
                 domain names only.\n\n{}",
                wrap_untrusted_content(&user_input, 2000)
            );
            match model.invoke(ChatRequest::user(prompt)).await {
                Ok(response) => {
                    let trimmed = response.content.trim();
                    trimmed
                        .find('[')
                        .and_then(|start| trimmed.rfind(']').map(|end| &trimmed[start..=end]))
                        .and_then(|fragment| serde_json::from_str::<Vec<String>>(fragment).ok())
                        .unwrap_or_else(|| {
                            SCOUT_FALLBACK_DOMAINS.iter().map(|d| d.to_string()).collect()
                        })
                }
                Err(e) => {
                    warn!(error = %e, "Domain scouting model call failed, using fallback list");
                    SCOUT_FALLBACK_DOMAINS.iter().map(|d| d.to_string()).collect()
                }
            }
        }
        None => SCOUT_FALLBACK_DOMAINS.iter().map(|d| d.to_string()).collect(),
    };

    let mut lines = vec!["🧭 Proposed domains to expand into:\n".to_string()];
    for (i, domain) in proposals.iter().enumerate() {
        let category = crate::taxonomy::category_by_domain(domain);
        lines.push(format!("{}. {} ({})", i + 1, domain, category.label));
    }

    let mut notes = Map::new();
    notes.insert(
        "scouting_results".to_string(),
        json!({"proposed_domains": proposals}),
    );
    Ok(StateUpdate {
        working_notes: Some(notes),
        final_response: Some(lines.join("\n")),
        ..StateUpdate::default()
    })
}

/// Run the source gatherer and domain scout concurrently and merge their
/// updates (used to exercise parallel agent execution).
pub async fn parallel_agents_node(ctx: &AppContext, state: &AgentState) -> Result<StateUpdate> {
    let (gather, scout) = tokio::join!(
        source_gatherer_node(ctx, state),
        domain_scout_node(ctx, state)
    );

    let mut notes = Map::new();
    let mut responses = Vec::new();

    for result in [gather, scout] {
        match result {
            Ok(update) => {
                if let Some(update_notes) = update.working_notes {
                    notes.extend(update_notes);
                }
                if let Some(response) = update.final_response {
                    responses.push(response);
                }
            }
            Err(e) => responses.push(format!("❌ Agent failed: {}", e)),
        }
    }

    Ok(StateUpdate {
        working_notes: Some(notes),
        final_response: Some(responses.join("\n\n")),
        ..StateUpdate::default()
    })
}
