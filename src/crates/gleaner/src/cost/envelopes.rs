//! Budget envelopes: per-task, per-agent/day, per-queue-concurrency, and
//! per-tool-call caps layered on top of the hard budget limits.

use crate::config::Config;
use crate::cost::tracker::CostTracker;
use crate::error::{GleanerError, Result};
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Envelope accounting windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeWindow {
    AllTime,
    Daily,
    PerCall,
}

/// One budget envelope: a cap with a scope and a window.
#[derive(Debug)]
pub struct BudgetEnvelope {
    pub scope: String,
    pub cap_usd: f64,
    pub window: EnvelopeWindow,
    spent_usd: f64,
    daily_spent: HashMap<NaiveDate, f64>,
    call_count: usize,
}

impl BudgetEnvelope {
    fn new(scope: &str, cap_usd: f64, window: EnvelopeWindow) -> Self {
        Self {
            scope: scope.to_string(),
            cap_usd,
            window,
            spent_usd: 0.0,
            daily_spent: HashMap::new(),
            call_count: 0,
        }
    }

    /// Check whether spending `additional_cost` would exceed the cap.
    fn check(&self, additional_cost: f64) -> (bool, Option<String>) {
        match self.window {
            EnvelopeWindow::AllTime => {
                if self.spent_usd + additional_cost > self.cap_usd {
                    return (
                        false,
                        Some(format!(
                            "Budget envelope '{}' exceeded: ${:.4} + ${:.4} > ${:.2}",
                            self.scope, self.spent_usd, additional_cost, self.cap_usd
                        )),
                    );
                }
            }
            EnvelopeWindow::Daily => {
                let today = Utc::now().date_naive();
                let spent = self.daily_spent.get(&today).copied().unwrap_or(0.0);
                if spent + additional_cost > self.cap_usd {
                    return (
                        false,
                        Some(format!(
                            "Daily budget envelope '{}' exceeded: ${:.4} + ${:.4} > ${:.2}",
                            self.scope, spent, additional_cost, self.cap_usd
                        )),
                    );
                }
            }
            EnvelopeWindow::PerCall => {
                if additional_cost > self.cap_usd {
                    return (
                        false,
                        Some(format!(
                            "Per-call budget envelope '{}' exceeded: ${:.4} > ${:.2}",
                            self.scope, additional_cost, self.cap_usd
                        )),
                    );
                }
            }
        }
        (true, None)
    }

    fn record_spend(&mut self, cost_usd: f64) {
        self.spent_usd += cost_usd;
        if self.window == EnvelopeWindow::Daily {
            let today = Utc::now().date_naive();
            *self.daily_spent.entry(today).or_insert(0.0) += cost_usd;
        }
        self.call_count += 1;
    }
}

/// Manages the envelope set and checks them together.
#[derive(Clone, Default)]
pub struct EnvelopeManager {
    tracker: Option<CostTracker>,
    envelopes: Arc<Mutex<HashMap<String, BudgetEnvelope>>>,
}

impl EnvelopeManager {
    pub fn new(tracker: CostTracker) -> Self {
        Self {
            tracker: Some(tracker),
            envelopes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build from configuration.
    pub fn from_config(config: &Config, tracker: CostTracker) -> Self {
        let manager = Self::new(tracker);
        if let Some(cap) = config.cost_per_task_cap_usd {
            manager.set_envelope("per_task", cap, EnvelopeWindow::AllTime);
        }
        if let Some(cap) = config.cost_per_agent_daily_cap_usd {
            manager.set_envelope("per_agent", cap, EnvelopeWindow::Daily);
        }
        if let Some(cap) = config.cost_per_queue_concurrency_cap_usd {
            manager.set_envelope("per_queue_concurrency", cap, EnvelopeWindow::PerCall);
        }
        if let Some(cap) = config.cost_per_tool_call_cap_usd {
            manager.set_envelope("per_tool_call", cap, EnvelopeWindow::PerCall);
        }
        manager
    }

    /// Set or replace an envelope.
    pub fn set_envelope(&self, scope: &str, cap_usd: f64, window: EnvelopeWindow) {
        self.envelopes
            .lock()
            .insert(scope.to_string(), BudgetEnvelope::new(scope, cap_usd, window));
        info!(scope = %scope, cap_usd, "Set budget envelope");
    }

    fn check_envelope(&self, scope: &str, additional_cost: f64) -> (bool, Option<String>) {
        let envelopes = self.envelopes.lock();
        match envelopes.get(scope) {
            Some(envelope) => envelope.check(additional_cost),
            None => (true, None),
        }
    }

    /// Check the per-task cap.
    pub fn check_task_cap(&self, _task_id: &str, additional_cost: f64) -> (bool, Option<String>) {
        self.check_envelope("per_task", additional_cost)
    }

    /// Check the per-agent daily cap against the agent's tracked spend.
    pub fn check_agent_daily_cap(
        &self,
        agent: &str,
        additional_cost: f64,
    ) -> (bool, Option<String>) {
        let envelopes = self.envelopes.lock();
        let Some(envelope) = envelopes.get("per_agent") else {
            return (true, None);
        };
        let cap = envelope.cap_usd;
        drop(envelopes);

        let spent = self
            .tracker
            .as_ref()
            .map(|t| t.agent_daily_cost(None, agent))
            .unwrap_or(0.0);
        if spent + additional_cost > cap {
            return (
                false,
                Some(format!(
                    "Agent '{}' daily cap exceeded: ${:.4} + ${:.4} > ${:.2}",
                    agent, spent, additional_cost, cap
                )),
            );
        }
        (true, None)
    }

    /// Check the per-queue-concurrency (per-call) cap.
    pub fn check_queue_concurrency_cap(
        &self,
        _queue: &str,
        additional_cost: f64,
    ) -> (bool, Option<String>) {
        self.check_envelope("per_queue_concurrency", additional_cost)
    }

    /// Check the per-tool-call cap.
    pub fn check_tool_call_cap(
        &self,
        _tool_name: &str,
        additional_cost: f64,
    ) -> (bool, Option<String>) {
        self.check_envelope("per_tool_call", additional_cost)
    }

    /// Record spend against the per-task envelope.
    pub fn record_task_spend(&self, cost_usd: f64) {
        if let Some(envelope) = self.envelopes.lock().get_mut("per_task") {
            envelope.record_spend(cost_usd);
        }
    }

    /// Enforce every applicable cap; the first violation wins.
    pub fn enforce_all_caps(
        &self,
        task_id: Option<&str>,
        agent: Option<&str>,
        queue: Option<&str>,
        tool_name: Option<&str>,
        additional_cost: f64,
    ) -> Result<()> {
        if let Some(task_id) = task_id {
            let (allowed, reason) = self.check_task_cap(task_id, additional_cost);
            if !allowed {
                return Err(GleanerError::BudgetExceeded(reason.unwrap_or_default()));
            }
        }
        if let Some(agent) = agent {
            let (allowed, reason) = self.check_agent_daily_cap(agent, additional_cost);
            if !allowed {
                return Err(GleanerError::BudgetExceeded(reason.unwrap_or_default()));
            }
        }
        if let Some(queue) = queue {
            let (allowed, reason) = self.check_queue_concurrency_cap(queue, additional_cost);
            if !allowed {
                return Err(GleanerError::BudgetExceeded(reason.unwrap_or_default()));
            }
        }
        if let Some(tool_name) = tool_name {
            let (allowed, reason) = self.check_tool_call_cap(tool_name, additional_cost);
            if !allowed {
                return Err(GleanerError::BudgetExceeded(reason.unwrap_or_default()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::tracker::CallScope;

    #[test]
    fn test_per_call_envelope() {
        let manager = EnvelopeManager::new(CostTracker::new());
        manager.set_envelope("per_tool_call", 0.01, EnvelopeWindow::PerCall);

        let (allowed, _) = manager.check_tool_call_cap("fetch", 0.005);
        assert!(allowed);
        let (allowed, reason) = manager.check_tool_call_cap("fetch", 0.05);
        assert!(!allowed);
        assert!(reason.unwrap().contains("Per-call budget envelope"));
    }

    #[test]
    fn test_per_task_all_time_envelope() {
        let manager = EnvelopeManager::new(CostTracker::new());
        manager.set_envelope("per_task", 0.01, EnvelopeWindow::AllTime);

        manager.record_task_spend(0.008);
        let (allowed, _) = manager.check_task_cap("t1", 0.001);
        assert!(allowed);
        let (allowed, _) = manager.check_task_cap("t1", 0.005);
        assert!(!allowed);
    }

    #[test]
    fn test_agent_daily_cap_uses_tracker() {
        let tracker = CostTracker::new();
        let manager = EnvelopeManager::new(tracker.clone());
        manager.set_envelope("per_agent", 0.01, EnvelopeWindow::Daily);

        tracker.record_call(
            "unknown-model",
            "openai",
            8_000, // $0.008 at default pricing
            0,
            &CallScope {
                agent: Some("extractor".to_string()),
                ..CallScope::default()
            },
            0.0,
            true,
            None,
        );

        let (allowed, _) = manager.check_agent_daily_cap("extractor", 0.001);
        assert!(allowed);
        let (allowed, reason) = manager.check_agent_daily_cap("extractor", 0.005);
        assert!(!allowed);
        assert!(reason.unwrap().contains("Agent 'extractor' daily cap"));

        // A different agent has a fresh allowance.
        let (allowed, _) = manager.check_agent_daily_cap("linker", 0.005);
        assert!(allowed);
    }

    #[test]
    fn test_enforce_all_caps_layering() {
        let manager = EnvelopeManager::new(CostTracker::new());
        manager.set_envelope("per_tool_call", 0.01, EnvelopeWindow::PerCall);

        // Passing every scope: only the tool cap is configured, and it denies.
        let result = manager.enforce_all_caps(
            Some("t1"),
            Some("extractor"),
            Some("ingestion"),
            Some("llm_call"),
            0.05,
        );
        assert!(matches!(result, Err(GleanerError::BudgetExceeded(_))));

        // Under the cap, everything passes.
        assert!(manager
            .enforce_all_caps(Some("t1"), None, None, Some("llm_call"), 0.005)
            .is_ok());
    }

    #[test]
    fn test_unconfigured_envelopes_allow() {
        let manager = EnvelopeManager::new(CostTracker::new());
        assert!(manager
            .enforce_all_caps(Some("t"), Some("a"), Some("q"), Some("tool"), 100.0)
            .is_ok());
    }
}
