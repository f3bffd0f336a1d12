//! Cost-tracked model client.
//!
//! Wraps any [`ChatModel`] with the full governance path: circuit breaker
//! check, cost estimation, envelope and hard-cap enforcement before the
//! call, one transparent retry for transient provider errors, and cost
//! recording after. Budget violations are never retried and pause the
//! scoped domain's breaker.

use crate::breaker::BreakerRegistry;
use crate::cost::budget::BudgetManager;
use crate::cost::envelopes::EnvelopeManager;
use crate::cost::tracker::{CallScope, CostTracker};
use crate::error::{GleanerError, Result};
use llm::pricing::calculate_cost;
use llm::{estimate_tokens, ChatModel, ChatRequest, ChatResponse, ModelTier, Usage};
use std::sync::Arc;
use std::time::Instant;
use tooling::retry::{with_retry, RetryConfig};
use tracing::warn;

/// If the actual cost exceeds the estimate by this factor, budgets are
/// re-checked after the call.
const ESTIMATE_OVERRUN_FACTOR: f64 = 1.5;

/// Scope labels for one tracked call site.
#[derive(Debug, Clone, Default)]
pub struct ModelScope {
    pub domain: Option<String>,
    pub queue: Option<String>,
    pub agent: Option<String>,
    pub task_id: Option<String>,
}

impl ModelScope {
    pub fn agent(name: &str) -> Self {
        Self {
            agent: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_domain(mut self, domain: Option<&str>) -> Self {
        self.domain = domain.map(|d| d.to_string());
        self
    }

    pub fn with_queue(mut self, queue: Option<&str>) -> Self {
        self.queue = queue.map(|q| q.to_string());
        self
    }

    pub fn with_task(mut self, task_id: Option<&str>) -> Self {
        self.task_id = task_id.map(|t| t.to_string());
        self
    }

    fn call_scope(&self) -> CallScope {
        CallScope {
            domain: self.domain.clone(),
            queue: self.queue.clone(),
            agent: self.agent.clone(),
        }
    }
}

/// A [`ChatModel`] wrapped with budget enforcement and cost tracking.
#[derive(Clone)]
pub struct TrackedModel {
    inner: Arc<dyn ChatModel>,
    scope: ModelScope,
    breakers: BreakerRegistry,
    tracker: CostTracker,
    budget: BudgetManager,
    envelopes: EnvelopeManager,
}

impl TrackedModel {
    pub fn new(
        inner: Arc<dyn ChatModel>,
        scope: ModelScope,
        breakers: BreakerRegistry,
        tracker: CostTracker,
        budget: BudgetManager,
        envelopes: EnvelopeManager,
    ) -> Self {
        Self {
            inner,
            scope,
            breakers,
            tracker,
            budget,
            envelopes,
        }
    }

    /// Rough pre-call cost estimate: input from prompt length, output
    /// assumed half the input.
    fn estimate(&self, request: &ChatRequest) -> (usize, usize, f64) {
        let input_tokens = estimate_tokens(request.content_len());
        let output_tokens = (input_tokens / 2).max(1);
        let cost = calculate_cost(self.inner.model_name(), input_tokens, output_tokens);
        (input_tokens, output_tokens, cost)
    }

    /// Run one chat completion through the governance path.
    pub async fn invoke(&self, request: ChatRequest) -> Result<ChatResponse> {
        // 1. Circuit check for the scoped domain. Fail fast when paused.
        if let Some(domain) = &self.scope.domain {
            if !self.breakers.allow_domain(domain) {
                return Err(GleanerError::CircuitOpen(format!(
                    "Domain '{}' is paused",
                    domain
                )));
            }
        }

        // 2. Estimate, then 3. enforce envelopes and hard caps.
        let (est_input, _est_output, est_cost) = self.estimate(&request);

        self.envelopes.enforce_all_caps(
            self.scope.task_id.as_deref(),
            self.scope.agent.as_deref(),
            self.scope.queue.as_deref(),
            Some("llm_invoke"),
            est_cost,
        )?;

        if let Err(e) = self.budget.enforce(
            self.scope.domain.as_deref(),
            self.scope.queue.as_deref(),
            est_cost,
        ) {
            if let Some(domain) = &self.scope.domain {
                self.breakers.pause_domain(domain);
                warn!(domain = %domain, "Paused domain: budget exceeded before call");
            }
            return Err(e);
        }

        // 4. Invoke with one transparent retry for transient errors.
        let start = Instant::now();
        let result = with_retry(
            &RetryConfig::single(),
            "llm_invoke",
            || self.inner.chat(request.clone()),
            |e| e.is_retryable(),
        )
        .await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(response) => {
                // 5. Actual usage, or the estimate when the provider gave
                // no metadata.
                let usage = response.usage.unwrap_or(Usage {
                    input_tokens: est_input,
                    output_tokens: estimate_tokens(response.content.len()),
                });

                // 6. Record, then re-check when the estimate was blown.
                let call = self.tracker.record_call(
                    self.inner.model_name(),
                    self.inner.provider().as_str(),
                    usage.input_tokens,
                    usage.output_tokens,
                    &self.scope.call_scope(),
                    duration_ms,
                    true,
                    None,
                );
                self.envelopes.record_task_spend(call.cost_usd);

                if call.cost_usd > est_cost * ESTIMATE_OVERRUN_FACTOR {
                    let (allowed, _) = self.budget.check(
                        self.scope.domain.as_deref(),
                        self.scope.queue.as_deref(),
                        0.0,
                    );
                    if !allowed {
                        if let Some(domain) = &self.scope.domain {
                            self.breakers.pause_domain(domain);
                            warn!(domain = %domain, "Paused domain: budget exceeded after call");
                        }
                    }
                }

                Ok(response)
            }
            Err(e) => {
                self.tracker.record_call(
                    self.inner.model_name(),
                    self.inner.provider().as_str(),
                    est_input,
                    0,
                    &self.scope.call_scope(),
                    duration_ms,
                    false,
                    Some(e.to_string()),
                );
                Err(GleanerError::Llm(e))
            }
        }
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// The per-tier model set built at startup.
#[derive(Clone, Default)]
pub struct ModelSet {
    pub cheap: Option<Arc<dyn ChatModel>>,
    pub mid: Option<Arc<dyn ChatModel>>,
    pub expensive: Option<Arc<dyn ChatModel>>,
}

impl ModelSet {
    /// The same model for every tier (tests, single-model deployments).
    pub fn uniform(model: Arc<dyn ChatModel>) -> Self {
        Self {
            cheap: Some(model.clone()),
            mid: Some(model.clone()),
            expensive: Some(model),
        }
    }

    /// Build from environment: the first configured provider supplies all
    /// three tier models. None when no provider is configured.
    pub fn from_env() -> Self {
        let Some(provider) = llm::Provider::detect() else {
            return Self::default();
        };
        let Ok(api_key) = provider.api_key() else {
            return Self::default();
        };

        let build = |tier: ModelTier| -> Option<Arc<dyn ChatModel>> {
            let model = llm::model_for_tier(provider, tier);
            let client: Arc<dyn ChatModel> = match provider {
                llm::Provider::OpenAi => {
                    Arc::new(llm::openai::OpenAiClient::new(api_key.clone(), model).ok()?)
                }
                llm::Provider::Anthropic => {
                    Arc::new(llm::anthropic::AnthropicClient::new(api_key.clone(), model).ok()?)
                }
                llm::Provider::Moonshot => {
                    Arc::new(llm::openai::OpenAiClient::moonshot(api_key.clone(), model).ok()?)
                }
            };
            Some(client)
        };

        Self {
            cheap: build(ModelTier::Cheap),
            mid: build(ModelTier::Mid),
            expensive: build(ModelTier::Expensive),
        }
    }

    /// The base model for a tier.
    pub fn for_tier(&self, tier: ModelTier) -> Option<Arc<dyn ChatModel>> {
        match tier {
            ModelTier::Cheap => self.cheap.clone(),
            ModelTier::Mid => self.mid.clone(),
            ModelTier::Expensive => self.expensive.clone(),
        }
    }

    /// The base model appropriate for a task label (unknown labels get mid).
    pub fn for_task(&self, task_type: &str) -> Option<Arc<dyn ChatModel>> {
        self.for_tier(llm::tier_for_task(task_type))
    }

    pub fn is_configured(&self) -> bool {
        self.mid.is_some() || self.cheap.is_some() || self.expensive.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::mock::MockModel;

    fn tracked(scope: ModelScope, mock: Arc<MockModel>) -> (TrackedModel, CostTracker, BreakerRegistry, BudgetManager) {
        let tracker = CostTracker::new();
        let breakers = BreakerRegistry::new();
        let budget = BudgetManager::new(tracker.clone());
        let envelopes = EnvelopeManager::new(tracker.clone());
        let model = TrackedModel::new(
            mock,
            scope,
            breakers.clone(),
            tracker.clone(),
            budget.clone(),
            envelopes,
        );
        (model, tracker, breakers, budget)
    }

    #[tokio::test]
    async fn test_successful_call_is_tracked() {
        let mock = Arc::new(MockModel::always("result"));
        let (model, tracker, _, _) =
            tracked(ModelScope::agent("extractor").with_domain(Some("Algebra")), mock);

        let response = model.invoke(ChatRequest::user("extract this")).await.unwrap();
        assert_eq!(response.content, "result");

        let stats = tracker.stats();
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.successful_calls, 1);
        assert!(tracker.domain_cost("Algebra") > 0.0);
    }

    #[tokio::test]
    async fn test_circuit_open_fails_fast() {
        let mock = Arc::new(MockModel::always("never"));
        let (model, _, breakers, _) =
            tracked(ModelScope::default().with_domain(Some("Algebra")), mock.clone());

        breakers.pause_domain("Algebra");
        let err = model.invoke(ChatRequest::user("q")).await.unwrap_err();
        assert!(matches!(err, GleanerError::CircuitOpen(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_budget_violation_pauses_domain_and_is_not_retried() {
        let mock = Arc::new(MockModel::always("never"));
        let (model, _, breakers, budget) =
            tracked(ModelScope::default().with_domain(Some("Algebra")), mock.clone());

        budget.set_global_daily_limit(0.0);

        let err = model.invoke(ChatRequest::user("q")).await.unwrap_err();
        assert!(matches!(err, GleanerError::BudgetExceeded(_)));
        assert_eq!(mock.call_count(), 0);
        assert!(!breakers.allow_domain("Algebra"));
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let mock = Arc::new(MockModel::always("ok"));
        mock.fail_with("503 unavailable");
        let (model, tracker, _, _) = tracked(ModelScope::default(), mock.clone());

        let err = model.invoke(ChatRequest::user("q")).await.unwrap_err();
        assert!(matches!(err, GleanerError::Llm(_)));
        // Initial attempt + exactly one retry.
        assert_eq!(mock.call_count(), 2);
        // Failed call recorded.
        assert_eq!(tracker.stats().failed_calls, 1);
    }

    #[tokio::test]
    async fn test_usage_fallback_when_provider_gives_none() {
        let mock = Arc::new(MockModel::always("four word reply here").with_usage(None));
        let (model, tracker, _, _) = tracked(ModelScope::default(), mock);

        model.invoke(ChatRequest::user("a prompt of some length")).await.unwrap();
        let calls = tracker.recent_calls(1);
        assert!(calls[0].input_tokens > 0);
        assert!(calls[0].output_tokens > 0);
    }

    #[test]
    fn test_model_set_uniform_and_task_lookup() {
        let mock: Arc<dyn ChatModel> = Arc::new(MockModel::always("x"));
        let set = ModelSet::uniform(mock);
        assert!(set.is_configured());
        assert!(set.for_task("triage").is_some());
        assert!(set.for_task("unheard_of_task").is_some());
    }
}
