//! Hard budget caps per domain, queue, and day.
//!
//! Caps are loaded from the environment at startup and can be changed at
//! runtime. `enforce` raises a budget error that is never retried.

use crate::config::Config;
use crate::cost::tracker::CostTracker;
use crate::error::{GleanerError, Result};
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Budget status summary for telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub global_daily_limit: Option<f64>,
    pub global_daily_spent: f64,
    pub global_daily_remaining: Option<f64>,
    pub domain_limits: HashMap<String, f64>,
    pub queue_limits: HashMap<String, f64>,
}

#[derive(Default)]
struct BudgetState {
    /// (date, domain, queue) -> daily limit
    daily_limits: HashMap<(NaiveDate, String, String), f64>,
    /// domain -> all-time limit
    domain_limits: HashMap<String, f64>,
    /// queue -> all-time limit
    queue_limits: HashMap<String, f64>,
    global_daily_limit: Option<f64>,
}

/// Manages budget caps and enforces them against the cost tracker.
#[derive(Clone)]
pub struct BudgetManager {
    tracker: CostTracker,
    state: Arc<Mutex<BudgetState>>,
}

impl BudgetManager {
    pub fn new(tracker: CostTracker) -> Self {
        Self {
            tracker,
            state: Arc::new(Mutex::new(BudgetState::default())),
        }
    }

    /// Build from configuration: global daily limit and per-domain caps.
    pub fn from_config(config: &Config, tracker: CostTracker) -> Self {
        let manager = Self::new(tracker);
        if let Some(limit) = config.llm_daily_budget_usd {
            manager.set_global_daily_limit(limit);
        }
        for (domain, limit) in &config.domain_budgets {
            manager.set_domain_limit(domain, *limit);
        }
        manager
    }

    pub fn set_global_daily_limit(&self, limit_usd: f64) {
        self.state.lock().global_daily_limit = Some(limit_usd);
        info!(limit_usd, "Set global daily budget limit");
    }

    pub fn set_domain_limit(&self, domain: &str, limit_usd: f64) {
        self.state
            .lock()
            .domain_limits
            .insert(domain.to_string(), limit_usd);
        info!(domain = %domain, limit_usd, "Set domain budget limit");
    }

    pub fn set_queue_limit(&self, queue: &str, limit_usd: f64) {
        self.state
            .lock()
            .queue_limits
            .insert(queue.to_string(), limit_usd);
        info!(queue = %queue, limit_usd, "Set queue budget limit");
    }

    /// Set a daily limit scoped to a domain/queue, defaulting to today.
    pub fn set_daily_limit(
        &self,
        limit_usd: f64,
        domain: Option<&str>,
        queue: Option<&str>,
        date: Option<NaiveDate>,
    ) {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let key = (
            date,
            domain.unwrap_or("global").to_string(),
            queue.unwrap_or("default").to_string(),
        );
        self.state.lock().daily_limits.insert(key, limit_usd);
        info!(limit_usd, domain = domain.unwrap_or("all"), "Set daily budget limit");
    }

    /// Check whether spending `additional_cost` stays within every
    /// applicable cap. Returns `(allowed, reason)`.
    pub fn check(
        &self,
        domain: Option<&str>,
        queue: Option<&str>,
        additional_cost: f64,
    ) -> (bool, Option<String>) {
        let today = Utc::now().date_naive();
        let state = self.state.lock();

        if let Some(limit) = state.global_daily_limit {
            let spent = self.tracker.daily_cost(Some(today), None, None);
            if spent + additional_cost > limit {
                return (
                    false,
                    Some(format!(
                        "Global daily budget exceeded: ${:.4} + ${:.4} > ${:.2}",
                        spent, additional_cost, limit
                    )),
                );
            }
        }

        if let Some(domain) = domain {
            let key = (
                today,
                domain.to_string(),
                queue.unwrap_or("default").to_string(),
            );
            if let Some(limit) = state.daily_limits.get(&key) {
                let spent = self.tracker.daily_cost(Some(today), Some(domain), queue);
                if spent + additional_cost > *limit {
                    return (
                        false,
                        Some(format!(
                            "Daily budget for domain '{}' exceeded: ${:.4} + ${:.4} > ${:.2}",
                            domain, spent, additional_cost, limit
                        )),
                    );
                }
            }

            if let Some(limit) = state.domain_limits.get(domain) {
                let spent = self.tracker.domain_cost(domain);
                if spent + additional_cost > *limit {
                    return (
                        false,
                        Some(format!(
                            "Domain budget for '{}' exceeded: ${:.4} + ${:.4} > ${:.2}",
                            domain, spent, additional_cost, limit
                        )),
                    );
                }
            }
        }

        if let Some(queue) = queue {
            if let Some(limit) = state.queue_limits.get(queue) {
                let spent = self.tracker.queue_cost(queue);
                if spent + additional_cost > *limit {
                    return (
                        false,
                        Some(format!(
                            "Queue budget for '{}' exceeded: ${:.4} + ${:.4} > ${:.2}",
                            queue, spent, additional_cost, limit
                        )),
                    );
                }
            }
        }

        (true, None)
    }

    /// Enforce the caps, raising a budget error when one would be exceeded.
    pub fn enforce(
        &self,
        domain: Option<&str>,
        queue: Option<&str>,
        additional_cost: f64,
    ) -> Result<()> {
        let (allowed, reason) = self.check(domain, queue, additional_cost);
        if !allowed {
            let reason = reason.unwrap_or_else(|| "budget exceeded".to_string());
            warn!(reason = %reason, "Budget enforcement denied spend");
            return Err(GleanerError::BudgetExceeded(reason));
        }
        Ok(())
    }

    /// Remaining budget for the narrowest applicable cap, None when no cap
    /// is set.
    pub fn remaining(&self, domain: Option<&str>, queue: Option<&str>) -> Option<f64> {
        let today = Utc::now().date_naive();
        let state = self.state.lock();

        if let Some(limit) = state.global_daily_limit {
            let spent = self.tracker.daily_cost(Some(today), None, None);
            return Some((limit - spent).max(0.0));
        }
        if let Some(domain) = domain {
            let key = (
                today,
                domain.to_string(),
                queue.unwrap_or("default").to_string(),
            );
            if let Some(limit) = state.daily_limits.get(&key) {
                let spent = self.tracker.daily_cost(Some(today), Some(domain), queue);
                return Some((limit - spent).max(0.0));
            }
            if let Some(limit) = state.domain_limits.get(domain) {
                return Some((limit - self.tracker.domain_cost(domain)).max(0.0));
            }
        }
        if let Some(queue) = queue {
            if let Some(limit) = state.queue_limits.get(queue) {
                return Some((limit - self.tracker.queue_cost(queue)).max(0.0));
            }
        }
        None
    }

    /// Budget status summary.
    pub fn status(&self) -> BudgetStatus {
        let today = Utc::now().date_naive();
        let state = self.state.lock();
        let spent = self.tracker.daily_cost(Some(today), None, None);
        BudgetStatus {
            global_daily_limit: state.global_daily_limit,
            global_daily_spent: spent,
            global_daily_remaining: state.global_daily_limit.map(|l| (l - spent).max(0.0)),
            domain_limits: state.domain_limits.clone(),
            queue_limits: state.queue_limits.clone(),
        }
    }
}
