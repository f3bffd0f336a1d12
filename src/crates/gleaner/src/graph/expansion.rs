//! Autonomous expansion: one discovery cycle across the configured domains,
//! run while the user deliberates over a key decision.

use crate::context::AppContext;
use crate::error::Result;
use crate::sources::discovery::discover_sources_for_domain;
use serde::Serialize;
use tracing::{info, warn};

/// Summary of one expansion cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionSummary {
    pub total_sources: usize,
    pub domains_explored: Vec<String>,
    pub with_primary_ids: usize,
    pub update_message: String,
}

/// Run one expansion cycle: discover sources across the configured
/// expansion domains and count those with primary identifiers.
pub async fn run_expansion_cycle(ctx: &AppContext) -> Result<ExpansionSummary> {
    let domains: Vec<String> = ctx
        .config
        .expansion_domains
        .iter()
        .take(ctx.config.expansion_max_domains)
        .cloned()
        .collect();

    if domains.is_empty() {
        return Ok(ExpansionSummary {
            total_sources: 0,
            domains_explored: Vec::new(),
            with_primary_ids: 0,
            update_message: "No expansion domains configured.".to_string(),
        });
    }

    let mut total_sources = 0;
    let mut with_primary_ids = 0;
    let mut explored = Vec::new();

    for domain in &domains {
        if !ctx.breakers.allow_domain(domain) {
            warn!(domain = %domain, "Expansion skipping paused domain");
            continue;
        }
        match discover_sources_for_domain(
            ctx.providers.as_ref(),
            &ctx.limiter,
            &ctx.breakers,
            None,
            domain,
            ctx.config.expansion_max_sources_per_domain,
            None,
            None,
        )
        .await
        {
            Ok(outcome) => {
                total_sources += outcome.sources.len();
                with_primary_ids += outcome
                    .sources
                    .iter()
                    .filter(|s| s.has_primary_id())
                    .count();
                explored.push(domain.clone());
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, "Expansion discovery failed");
            }
        }
    }

    let update_message = format!(
        "Expansion cycle: {} sources across {} domain(s), {} with primary IDs.",
        total_sources,
        explored.len(),
        with_primary_ids
    );
    info!(
        total_sources,
        domains = explored.len(),
        with_primary_ids,
        "Expansion cycle complete"
    );

    Ok(ExpansionSummary {
        total_sources,
        domains_explored: explored,
        with_primary_ids,
        update_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::testing::test_context_with_config;

    #[tokio::test]
    async fn test_no_domains_configured() {
        let tc = test_context_with_config(vec![], Config::default()).await;
        let summary = run_expansion_cycle(&tc.ctx).await.unwrap();
        assert_eq!(summary.total_sources, 0);
        assert!(summary.domains_explored.is_empty());
    }

    #[tokio::test]
    async fn test_explores_configured_domains() {
        let config = Config {
            expansion_domains: vec!["Algebra".to_string(), "Biology".to_string()],
            expansion_max_domains: 1,
            ..Config::default()
        };
        let tc = test_context_with_config(vec![], config).await;
        let summary = run_expansion_cycle(&tc.ctx).await.unwrap();
        // Bounded by expansion_max_domains.
        assert_eq!(summary.domains_explored, vec!["Algebra"]);
    }

    #[tokio::test]
    async fn test_paused_domain_skipped() {
        let config = Config {
            expansion_domains: vec!["Algebra".to_string()],
            ..Config::default()
        };
        let tc = test_context_with_config(vec![], config).await;
        tc.ctx.breakers.pause_domain("Algebra");
        let summary = run_expansion_cycle(&tc.ctx).await.unwrap();
        assert!(summary.domains_explored.is_empty());
    }
}
