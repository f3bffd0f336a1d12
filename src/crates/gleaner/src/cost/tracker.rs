//! Cost tracking for model API calls.
//!
//! Every call is recorded with provider pricing and indexed by
//! `(date, domain, queue)` so daily rollups are O(1). Thread-safe for
//! concurrent worker execution.

use chrono::{DateTime, NaiveDate, Utc};
use llm::pricing::calculate_cost;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Record of a single model API call with cost.
#[derive(Debug, Clone, Serialize)]
pub struct LlmCall {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub cost_usd: f64,
    pub domain: Option<String>,
    pub queue: Option<String>,
    pub agent: Option<String>,
    pub duration_ms: f64,
    pub success: bool,
    pub error: Option<String>,
}

/// Scope labels attached to a call for rollups.
#[derive(Debug, Clone, Default)]
pub struct CallScope {
    pub domain: Option<String>,
    pub queue: Option<String>,
    pub agent: Option<String>,
}

/// Cost statistics summary.
#[derive(Debug, Clone, Serialize)]
pub struct CostStats {
    pub total_calls: usize,
    pub successful_calls: usize,
    pub failed_calls: usize,
    pub total_cost_usd: f64,
    pub total_tokens: usize,
    pub top_domains: Vec<(String, f64)>,
    pub top_queues: Vec<(String, f64)>,
}

#[derive(Default)]
struct TrackerState {
    calls: Vec<LlmCall>,
    /// (date, domain-or-"global", queue-or-"default") -> cost
    daily_costs: HashMap<(NaiveDate, String, String), f64>,
    /// (date, agent) -> cost, for per-agent daily envelopes
    agent_daily_costs: HashMap<(NaiveDate, String), f64>,
    domain_costs: HashMap<String, f64>,
    queue_costs: HashMap<String, f64>,
}

/// Tracks model API costs per domain, queue, agent, and day.
#[derive(Clone, Default)]
pub struct CostTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a model call and return its cost record.
    #[allow(clippy::too_many_arguments)]
    pub fn record_call(
        &self,
        model: &str,
        provider: &str,
        input_tokens: usize,
        output_tokens: usize,
        scope: &CallScope,
        duration_ms: f64,
        success: bool,
        error: Option<String>,
    ) -> LlmCall {
        let cost = calculate_cost(model, input_tokens, output_tokens);
        let call = LlmCall {
            timestamp: Utc::now(),
            model: model.to_string(),
            provider: provider.to_string(),
            input_tokens,
            output_tokens,
            cost_usd: cost,
            domain: scope.domain.clone(),
            queue: scope.queue.clone(),
            agent: scope.agent.clone(),
            duration_ms,
            success,
            error,
        };

        let today = Utc::now().date_naive();
        let mut state = self.state.lock();
        state.calls.push(call.clone());

        let key = (
            today,
            scope.domain.clone().unwrap_or_else(|| "global".to_string()),
            scope.queue.clone().unwrap_or_else(|| "default".to_string()),
        );
        *state.daily_costs.entry(key).or_insert(0.0) += cost;

        if let Some(domain) = &scope.domain {
            *state.domain_costs.entry(domain.clone()).or_insert(0.0) += cost;
        }
        if let Some(queue) = &scope.queue {
            *state.queue_costs.entry(queue.clone()).or_insert(0.0) += cost;
        }
        if let Some(agent) = &scope.agent {
            *state
                .agent_daily_costs
                .entry((today, agent.clone()))
                .or_insert(0.0) += cost;
        }
        drop(state);

        debug!(
            model = %model,
            provider = %provider,
            input_tokens,
            output_tokens,
            cost_usd = cost,
            domain = scope.domain.as_deref().unwrap_or("-"),
            queue = scope.queue.as_deref().unwrap_or("-"),
            "Tracked model call"
        );

        call
    }

    /// Total cost for a day, optionally filtered by domain/queue.
    pub fn daily_cost(
        &self,
        date: Option<NaiveDate>,
        domain: Option<&str>,
        queue: Option<&str>,
    ) -> f64 {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let state = self.state.lock();
        if domain.is_none() && queue.is_none() {
            state
                .daily_costs
                .iter()
                .filter(|((d, _, _), _)| *d == date)
                .map(|(_, cost)| cost)
                .sum()
        } else {
            let key = (
                date,
                domain.unwrap_or("global").to_string(),
                queue.unwrap_or("default").to_string(),
            );
            state.daily_costs.get(&key).copied().unwrap_or(0.0)
        }
    }

    /// All-time cost for a domain.
    pub fn domain_cost(&self, domain: &str) -> f64 {
        self.state.lock().domain_costs.get(domain).copied().unwrap_or(0.0)
    }

    /// All-time cost for a queue.
    pub fn queue_cost(&self, queue: &str) -> f64 {
        self.state.lock().queue_costs.get(queue).copied().unwrap_or(0.0)
    }

    /// Cost for an agent on a given day.
    pub fn agent_daily_cost(&self, date: Option<NaiveDate>, agent: &str) -> f64 {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        self.state
            .lock()
            .agent_daily_costs
            .get(&(date, agent.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Total cost across all domains, queues, and days.
    pub fn total_cost(&self) -> f64 {
        self.state.lock().daily_costs.values().sum()
    }

    /// Most recent calls, oldest first.
    pub fn recent_calls(&self, limit: usize) -> Vec<LlmCall> {
        let state = self.state.lock();
        let skip = state.calls.len().saturating_sub(limit);
        state.calls[skip..].to_vec()
    }

    /// Statistics summary.
    pub fn stats(&self) -> CostStats {
        let state = self.state.lock();
        let total_calls = state.calls.len();
        let successful_calls = state.calls.iter().filter(|c| c.success).count();
        let total_tokens = state
            .calls
            .iter()
            .map(|c| c.input_tokens + c.output_tokens)
            .sum();

        let mut top_domains: Vec<(String, f64)> = state
            .domain_costs
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        top_domains.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        top_domains.truncate(10);

        let mut top_queues: Vec<(String, f64)> = state
            .queue_costs
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        top_queues.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        top_queues.truncate(10);

        CostStats {
            total_calls,
            successful_calls,
            failed_calls: total_calls - successful_calls,
            total_cost_usd: state.daily_costs.values().sum(),
            total_tokens,
            top_domains,
            top_queues,
        }
    }
}
