//! Telemetry aggregation: one snapshot combining breaker health, cost,
//! tasks, error rates, processing rates, and KG state.
//!
//! The aggregator never fails: each subsection is guarded and reports
//! `{"error": …}` when its source does.

use crate::context::AppContext;
use crate::task_state::ThreadTaskStatus;
use chrono::Utc;
use serde_json::{json, Value};

/// Full system snapshot for admin views and supervisor prompts.
pub async fn get_system_state(ctx: &AppContext) -> Value {
    json!({
        "timestamp": Utc::now().to_rfc3339(),
        "agent_health": agent_health(ctx),
        "cost_tracking": cost_tracking(ctx),
        "task_states": task_states(ctx).await,
        "error_rates": error_rates(ctx),
        "processing_rates": processing_rates(ctx).await,
        "kg_statistics": kg_statistics(ctx).await,
    })
}

fn agent_health(ctx: &AppContext) -> Value {
    let status = ctx.breakers.list_status();

    let count_by_state = |circuits: &[crate::breaker::CircuitStatus]| {
        let mut by_state = serde_json::Map::new();
        for circuit in circuits {
            let key = circuit.state.as_str().to_string();
            let count = by_state.get(&key).and_then(|v| v.as_u64()).unwrap_or(0);
            by_state.insert(key, json!(count + 1));
        }
        by_state
    };
    let open_keys = |circuits: &[crate::breaker::CircuitStatus], state: &str| -> Vec<String> {
        circuits
            .iter()
            .filter(|c| c.state.as_str() == state)
            .map(|c| c.key.clone())
            .collect()
    };

    json!({
        "domains": {
            "total": status.domains.len(),
            "by_state": count_by_state(&status.domains),
            "open": open_keys(&status.domains, "open"),
            "half_open": open_keys(&status.domains, "half_open"),
        },
        "sources": {
            "total": status.sources.len(),
            "by_state": count_by_state(&status.sources),
            "open": open_keys(&status.sources, "open"),
            "half_open": open_keys(&status.sources, "half_open"),
        },
    })
}

fn cost_tracking(ctx: &AppContext) -> Value {
    let stats = ctx.tracker.stats();
    let budget = ctx.budget.status();
    json!({
        "total_cost_usd": stats.total_cost_usd,
        "total_calls": stats.total_calls,
        "successful_calls": stats.successful_calls,
        "failed_calls": stats.failed_calls,
        "total_tokens": stats.total_tokens,
        "top_domains": stats.top_domains.iter().take(5).collect::<Vec<_>>(),
        "top_queues": stats.top_queues.iter().take(5).collect::<Vec<_>>(),
        "budget": {
            "global_daily_limit": budget.global_daily_limit,
            "global_daily_spent": budget.global_daily_spent,
            "global_daily_remaining": budget.global_daily_remaining,
            "domain_limits": budget.domain_limits.len(),
            "queue_limits": budget.queue_limits.len(),
        },
    })
}

async fn task_states(ctx: &AppContext) -> Value {
    let recent = ctx.task_states.list_recent(100);
    let mut by_status = serde_json::Map::new();
    for state in &recent {
        let key = state.status.as_str().to_string();
        let count = by_status.get(&key).and_then(|v| v.as_u64()).unwrap_or(0);
        by_status.insert(key, json!(count + 1));
    }
    let failures: Vec<Value> = recent
        .iter()
        .filter(|s| s.status == ThreadTaskStatus::Failed)
        .take(10)
        .map(|s| {
            json!({
                "thread_id": s.thread_id,
                "agent": s.agent,
                "error": s.error,
                "updated_at": s.updated_at.to_rfc3339(),
            })
        })
        .collect();

    let queue_counts = match ctx.queue.status_counts().await {
        Ok(counts) => json!(counts.into_iter().collect::<std::collections::HashMap<_, _>>()),
        Err(e) => json!({"error": e.to_string()}),
    };

    json!({
        "total_tasks": recent.len(),
        "by_status": by_status,
        "queue": queue_counts,
        "recent_failures": failures,
    })
}

fn error_rates(ctx: &AppContext) -> Value {
    let recent = ctx.tracker.recent_calls(100);
    let errors: Vec<_> = recent.iter().filter(|c| !c.success).collect();
    let error_rate = if recent.is_empty() {
        0.0
    } else {
        errors.len() as f64 / recent.len() as f64
    };

    let mut by_provider = serde_json::Map::new();
    for call in &errors {
        let count = by_provider
            .get(&call.provider)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        by_provider.insert(call.provider.clone(), json!(count + 1));
    }

    json!({
        "recent_calls": recent.len(),
        "errors": errors.len(),
        "error_rate": error_rate,
        "errors_by_provider": by_provider,
        "recent_errors": errors.iter().take(10).map(|c| json!({
            "model": c.model,
            "provider": c.provider,
            "error": c.error,
            "timestamp": c.timestamp.to_rfc3339(),
        })).collect::<Vec<_>>(),
    })
}

async fn processing_rates(ctx: &AppContext) -> Value {
    let recent = match ctx.queue.recent_tasks(100).await {
        Ok(tasks) => tasks,
        Err(e) => return json!({"error": e.to_string()}),
    };
    let now = Utc::now();
    let last_hour = recent
        .iter()
        .filter(|t| (now - t.updated_at).num_seconds() < 3600)
        .count();
    let completed = recent
        .iter()
        .filter(|t| t.status == crate::queue::TaskStatus::Completed)
        .count();
    let completion_rate = if recent.is_empty() {
        0.0
    } else {
        completed as f64 / recent.len() as f64
    };

    json!({
        "recent_tasks": recent.len(),
        "tasks_last_hour": last_hour,
        "completed_tasks": completed,
        "completion_rate": completion_rate,
    })
}

async fn kg_statistics(ctx: &AppContext) -> Value {
    let current_version = match ctx.changelog.current_version().await {
        Ok(version) => version,
        Err(e) => return json!({"error": e.to_string()}),
    };
    let recent = match ctx.changelog.list_versions(10).await {
        Ok(entries) => entries,
        Err(e) => return json!({"error": e.to_string()}),
    };
    json!({
        "current_version": current_version,
        "recent_changes": recent.len(),
        "latest_change": recent.first().map(|e| json!({
            "version": e.version,
            "summary": e.summary,
            "source_agent": e.source_agent,
            "timestamp": e.timestamp.to_rfc3339(),
        })),
    })
}

/// Render the snapshot as a compact human-readable report.
pub fn summarize_state(state: &Value) -> String {
    let mut parts = vec!["📊 System State Summary".to_string()];

    let health = &state["agent_health"];
    if health.get("error").is_none() {
        parts.push(format!(
            "\n🔧 Agent Health:\n  • Domains: {} total\n  • Sources: {} total",
            health["domains"]["total"], health["sources"]["total"]
        ));
        if let Some(open) = health["domains"]["open"].as_array() {
            if !open.is_empty() {
                let names: Vec<&str> = open.iter().filter_map(|v| v.as_str()).take(5).collect();
                parts.push(format!("  • ⚠️ Paused domains: {}", names.join(", ")));
            }
        }
    }

    let costs = &state["cost_tracking"];
    if costs.get("error").is_none() {
        parts.push(format!(
            "\n💰 Cost:\n  • Total: ${:.4}\n  • Calls: {} ({} successful)",
            costs["total_cost_usd"].as_f64().unwrap_or(0.0),
            costs["total_calls"],
            costs["successful_calls"]
        ));
        if let Some(limit) = costs["budget"]["global_daily_limit"].as_f64() {
            parts.push(format!(
                "  • Daily budget: ${:.2} / ${:.2} (${:.2} remaining)",
                costs["budget"]["global_daily_spent"].as_f64().unwrap_or(0.0),
                limit,
                costs["budget"]["global_daily_remaining"].as_f64().unwrap_or(0.0),
            ));
        }
    }

    let tasks = &state["task_states"];
    if tasks.get("error").is_none() {
        parts.push(format!("\n📋 Tasks:\n  • Recent: {}", tasks["total_tasks"]));
        if let Some(by_status) = tasks["by_status"].as_object() {
            for (status, count) in by_status {
                parts.push(format!("  • {}: {}", status, count));
            }
        }
    }

    let errors = &state["error_rates"];
    if errors.get("error").is_none() {
        parts.push(format!(
            "\n❌ Errors:\n  • Rate: {:.1}% ({} / {} calls)",
            errors["error_rate"].as_f64().unwrap_or(0.0) * 100.0,
            errors["errors"],
            errors["recent_calls"]
        ));
    }

    let processing = &state["processing_rates"];
    if processing.get("error").is_none() {
        parts.push(format!(
            "\n⚡ Processing:\n  • Tasks last hour: {}\n  • Completion rate: {:.1}%",
            processing["tasks_last_hour"],
            processing["completion_rate"].as_f64().unwrap_or(0.0) * 100.0
        ));
    }

    let kg = &state["kg_statistics"];
    if kg.get("error").is_none() {
        parts.push(format!(
            "\n📚 Knowledge Graph:\n  • Current version: {}\n  • Recent changes: {}",
            kg["current_version"], kg["recent_changes"]
        ));
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::test_context;
    use crate::cost::tracker::CallScope;

    #[tokio::test]
    async fn test_snapshot_sections_present() {
        let tc = test_context(vec![]).await;
        tc.ctx.breakers.pause_domain("Algebra");
        tc.ctx.tracker.record_call(
            "gpt-4o-mini",
            "openai",
            100,
            100,
            &CallScope::default(),
            0.0,
            false,
            Some("boom".into()),
        );

        let state = get_system_state(&tc.ctx).await;
        assert_eq!(state["agent_health"]["domains"]["total"], 1);
        assert_eq!(state["agent_health"]["domains"]["open"][0], "domain:Algebra");
        assert_eq!(state["error_rates"]["errors"], 1);
        assert_eq!(state["kg_statistics"]["current_version"], 0);
    }

    #[tokio::test]
    async fn test_summary_renders() {
        let tc = test_context(vec![]).await;
        tc.ctx.budget.set_global_daily_limit(5.0);
        let state = get_system_state(&tc.ctx).await;
        let summary = summarize_state(&state);
        assert!(summary.contains("System State Summary"));
        assert!(summary.contains("Daily budget"));
        assert!(summary.contains("Knowledge Graph"));
    }

    #[tokio::test]
    async fn test_summary_never_panics_on_partial_state() {
        let summary = summarize_state(&json!({"agent_health": {"error": "down"}}));
        assert!(summary.contains("System State Summary"));
    }
}
