//! Source discovery: concurrent provider queries ranked by quality and cost.
//!
//! Every provider dispatch consults the rate limiter and circuit breaker
//! first and records the result after; a denied provider is skipped
//! silently so discovery still returns ranked results from the rest.

use crate::breaker::BreakerRegistry;
use crate::error::Result;
use crate::model::TrackedModel;
use crate::ratelimit::RateLimiter;
use crate::security::wrap_untrusted_content;
use crate::sources::providers::{ProviderClient, ProviderPool, SourceCandidate, SourceProvider};
use crate::sources::scoring::rank_sources;
use futures::future::join_all;
use llm::ChatRequest;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default quality threshold when the domain has none configured.
const DEFAULT_MIN_QUALITY: f64 = 0.55;

/// Minimum source count before discovery recommends widening the search.
const MIN_SOURCES_RECOMMENDED: usize = 2;

/// Results per provider per query.
const PER_PROVIDER_LIMIT: usize = 5;

/// Timeout for model-assisted query generation; on timeout the
/// deterministic queries are used alone.
const QUERY_GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Discovery statistics.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryStats {
    pub total_discovered: usize,
    pub meets_quality_threshold: usize,
    pub returned: usize,
    pub average_quality: f64,
    pub average_priority: f64,
    pub free_sources: usize,
    pub paid_sources: usize,
    pub source_types: HashMap<String, usize>,
}

/// The full discovery result.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOutcome {
    pub domain: String,
    pub sources: Vec<SourceCandidate>,
    pub statistics: DiscoveryStats,
    pub recommendations: Vec<String>,
    pub quality_threshold: f64,
}

/// Generate search queries for a domain: deterministic variants plus
/// optional model-assisted queries under a bounded timeout.
pub async fn generate_search_queries(
    domain_name: &str,
    query_model: Option<&TrackedModel>,
) -> Vec<String> {
    let mut queries = vec![domain_name.to_string()];

    let words: Vec<&str> = domain_name.split_whitespace().collect();
    if words.len() > 1 {
        queries.push(words[..2.min(words.len())].join(" "));
        queries.push(words[0].to_string());
    }
    let category = crate::taxonomy::category_by_domain(domain_name);
    queries.push(format!("{} {}", domain_name, category.key));

    if let Some(model) = query_model {
        let prompt = format!(
            "Generate 3-5 optimized search queries for finding educational and academic \
             sources about the domain named in the data block. Cover research papers, \
             textbooks, and online courses. Respond with a JSON array of query strings.\n\n{}",
            wrap_untrusted_content(domain_name, 1000)
        );
        match tokio::time::timeout(QUERY_GENERATION_TIMEOUT, model.invoke(ChatRequest::user(prompt)))
            .await
        {
            Ok(Ok(response)) => {
                for query in parse_query_array(&response.content) {
                    if !queries.iter().any(|q| q.eq_ignore_ascii_case(&query)) {
                        queries.push(query);
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(domain = %domain_name, error = %e, "Query generation failed, using basic queries");
            }
            Err(_) => {
                warn!(domain = %domain_name, "Query generation timed out, using basic queries");
            }
        }
    }

    // Dedupe case-insensitively, preserving order.
    let mut seen = std::collections::HashSet::new();
    queries.retain(|q| seen.insert(q.to_lowercase()));
    queries
}

fn json_array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").expect("hard-coded regex"))
}

fn parse_query_array(content: &str) -> Vec<String> {
    let Some(found) = json_array_re().find(content) else {
        return Vec::new();
    };
    serde_json::from_str::<Vec<String>>(found.as_str())
        .map(|queries| {
            queries
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Discover sources for a domain across the provider pools.
pub async fn discover_sources_for_domain(
    client: &dyn ProviderClient,
    limiter: &RateLimiter,
    breakers: &BreakerRegistry,
    query_model: Option<&TrackedModel>,
    domain_name: &str,
    max_sources: usize,
    min_quality: Option<f64>,
    pools: Option<&[ProviderPool]>,
) -> Result<DiscoveryOutcome> {
    info!(domain = %domain_name, max_sources, "Discovering sources");
    let min_quality = min_quality.unwrap_or(DEFAULT_MIN_QUALITY);

    let queries = generate_search_queries(domain_name, query_model).await;
    let query = queries.first().cloned().unwrap_or_else(|| domain_name.to_string());

    let selected_pools = pools.map(|p| p.to_vec()).unwrap_or_else(|| {
        vec![
            ProviderPool::Academic,
            ProviderPool::Educational,
            ProviderPool::General,
        ]
    });

    // Dispatch every eligible provider concurrently.
    let mut dispatched = Vec::new();
    for pool in &selected_pools {
        for provider in SourceProvider::in_pool(*pool) {
            let key = provider.key();
            if !breakers.allow_source(key) {
                debug!(provider = key, "Provider skipped: circuit open");
                continue;
            }
            let (allowed, reason) = limiter.check(key, Some(domain_name));
            if !allowed {
                debug!(provider = key, reason = reason.as_deref().unwrap_or(""), "Provider skipped: rate limited");
                continue;
            }
            limiter.record(key, Some(domain_name));
            dispatched.push((provider, client.search(provider, &query, PER_PROVIDER_LIMIT)));
        }
    }

    let (providers, futures): (Vec<_>, Vec<_>) = dispatched.into_iter().unzip();
    let results = join_all(futures).await;

    let mut all_sources = Vec::new();
    for (provider, result) in providers.into_iter().zip(results) {
        match result {
            Ok(mut sources) => {
                breakers.record_source_success(provider.key());
                for source in &mut sources {
                    source.domain = Some(domain_name.to_string());
                }
                all_sources.extend(sources);
            }
            Err(e) => {
                breakers.record_source_failure(provider.key());
                warn!(provider = provider.key(), error = %e, "Provider search failed");
            }
        }
    }

    let total_discovered = all_sources.len();

    // Score, filter by quality, rank by priority.
    let ranked = rank_sources(all_sources);
    let eligible: Vec<SourceCandidate> = ranked
        .into_iter()
        .filter(|s| s.quality_score >= min_quality)
        .collect();
    let meets_quality = eligible.len();

    // Type diversity: at most ceil(max/3) per type until the quota is met,
    // then fill by priority.
    let max_per_type = (max_sources).div_ceil(3).max(1);
    let mut top: Vec<SourceCandidate> = Vec::new();
    let mut type_counts: HashMap<String, usize> = HashMap::new();
    for source in &eligible {
        if top.len() >= max_sources {
            break;
        }
        let count = type_counts.entry(source.source_type.clone()).or_insert(0);
        if *count < max_per_type {
            *count += 1;
            top.push(source.clone());
        }
    }
    if top.len() < max_sources {
        for source in &eligible {
            if top.len() >= max_sources {
                break;
            }
            if !top.iter().any(|s| s.title == source.title && s.provider == source.provider) {
                top.push(source.clone());
            }
        }
    }

    let statistics = compute_stats(total_discovered, meets_quality, &top);
    let recommendations = build_recommendations(&statistics, min_quality);

    Ok(DiscoveryOutcome {
        domain: domain_name.to_string(),
        sources: top,
        statistics,
        recommendations,
        quality_threshold: min_quality,
    })
}

fn compute_stats(
    total_discovered: usize,
    meets_quality: usize,
    top: &[SourceCandidate],
) -> DiscoveryStats {
    let mut source_types = HashMap::new();
    for source in top {
        *source_types.entry(source.source_type.clone()).or_insert(0) += 1;
    }
    let free = top.iter().filter(|s| s.cost_score == 0.0).count();
    let average = |f: fn(&SourceCandidate) -> f64| {
        if top.is_empty() {
            0.0
        } else {
            top.iter().map(f).sum::<f64>() / top.len() as f64
        }
    };
    DiscoveryStats {
        total_discovered,
        meets_quality_threshold: meets_quality,
        returned: top.len(),
        average_quality: average(|s| s.quality_score),
        average_priority: average(|s| s.priority_score),
        free_sources: free,
        paid_sources: top.len() - free,
        source_types,
    }
}

fn build_recommendations(stats: &DiscoveryStats, min_quality: f64) -> Vec<String> {
    let mut recommendations = Vec::new();
    if stats.returned < MIN_SOURCES_RECOMMENDED {
        recommendations.push(format!(
            "Only {} sources found. Need at least {}.",
            stats.returned, MIN_SOURCES_RECOMMENDED
        ));
    }
    if stats.returned > 0 && stats.average_quality < min_quality {
        recommendations.push(format!(
            "Average source quality ({:.2}) below threshold ({:.2}). Consider expanding search.",
            stats.average_quality, min_quality
        ));
    }
    if stats.source_types.len() < 2 {
        recommendations.push("Low source diversity. Seek different source types.".to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted provider client for tests.
    struct ScriptedClient {
        by_provider: Mutex<HashMap<&'static str, Vec<SourceCandidate>>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                by_provider: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with(self, provider: SourceProvider, sources: Vec<SourceCandidate>) -> Self {
            self.by_provider.lock().unwrap().insert(provider.key(), sources);
            self
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedClient {
        async fn search(
            &self,
            provider: SourceProvider,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<SourceCandidate>> {
            self.calls.lock().unwrap().push(provider.key());
            Ok(self
                .by_provider
                .lock()
                .unwrap()
                .get(provider.key())
                .cloned()
                .unwrap_or_default())
        }
    }

    fn good_paper(title: &str) -> SourceCandidate {
        let mut source =
            SourceCandidate::new(title, SourceProvider::SemanticScholar, "peer_reviewed_journal");
        source.doi = Some(format!("10.1/{}", title));
        source.citation_count = Some(150);
        source.year = Some(chrono::Utc::now().year());
        source.url = Some("https://arxiv.org/abs/x".to_string());
        source
    }

    use chrono::Datelike;

    #[tokio::test]
    async fn test_discovery_ranks_and_annotates_domain() {
        let client = ScriptedClient::new()
            .with(SourceProvider::SemanticScholar, vec![good_paper("a"), good_paper("b")]);
        let limiter = RateLimiter::new();
        let breakers = BreakerRegistry::new();

        let outcome = discover_sources_for_domain(
            &client,
            &limiter,
            &breakers,
            None,
            "Algebra",
            10,
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome.statistics.total_discovered, 2);
        assert!(outcome.sources.iter().all(|s| s.domain.as_deref() == Some("Algebra")));
        assert!(outcome.sources[0].priority_score >= outcome.sources[1].priority_score);
    }

    #[tokio::test]
    async fn test_rate_limited_provider_skipped_silently() {
        let client = ScriptedClient::new()
            .with(SourceProvider::Arxiv, vec![good_paper("from-arxiv")])
            .with(SourceProvider::SemanticScholar, vec![good_paper("from-s2")]);
        let limiter = RateLimiter::new();
        let breakers = BreakerRegistry::new();

        // Exhaust arxiv's minute window.
        for _ in 0..10 {
            limiter.record("arxiv", None);
        }

        let outcome = discover_sources_for_domain(
            &client,
            &limiter,
            &breakers,
            None,
            "Algebra",
            10,
            None,
            None,
        )
        .await
        .unwrap();

        assert!(!client.calls().contains(&"arxiv"));
        assert!(outcome.sources.iter().any(|s| s.title == "from-s2"));
    }

    #[tokio::test]
    async fn test_breaker_open_provider_skipped() {
        let client =
            ScriptedClient::new().with(SourceProvider::Wikipedia, vec![good_paper("wiki")]);
        let limiter = RateLimiter::new();
        let breakers = BreakerRegistry::new();
        breakers.pause_source("wikipedia");

        discover_sources_for_domain(&client, &limiter, &breakers, None, "X", 10, None, None)
            .await
            .unwrap();
        assert!(!client.calls().contains(&"wikipedia"));
    }

    #[tokio::test]
    async fn test_provider_failure_records_breaker_failure() {
        struct FailingClient;
        #[async_trait]
        impl ProviderClient for FailingClient {
            async fn search(
                &self,
                _provider: SourceProvider,
                _query: &str,
                _limit: usize,
            ) -> Result<Vec<SourceCandidate>> {
                Err(crate::error::GleanerError::Other("boom".to_string()))
            }
        }

        let limiter = RateLimiter::new();
        let breakers = BreakerRegistry::new();
        // Each discovery records one failure per provider; after five rounds
        // the academic providers' circuits open.
        for _ in 0..5 {
            discover_sources_for_domain(
                &FailingClient,
                &limiter,
                &breakers,
                None,
                "X",
                10,
                None,
                Some(&[ProviderPool::Academic]),
            )
            .await
            .unwrap();
        }
        assert!(!breakers.allow_source("semantic_scholar"));
    }

    #[tokio::test]
    async fn test_type_diversity_cap() {
        let mut journals: Vec<SourceCandidate> = (0..9).map(|i| good_paper(&format!("j{}", i))).collect();
        let mut course = SourceCandidate::new("course", SourceProvider::MitOcw, "course");
        course.url = Some("https://ocw.mit.edu/x".to_string());
        course.year = Some(chrono::Utc::now().year());
        journals.push(course);

        let client = ScriptedClient::new().with(SourceProvider::SemanticScholar, journals);
        let limiter = RateLimiter::new();
        let breakers = BreakerRegistry::new();

        let outcome = discover_sources_for_domain(
            &client,
            &limiter,
            &breakers,
            None,
            "X",
            6,
            Some(0.0),
            Some(&[ProviderPool::Academic]),
        )
        .await
        .unwrap();

        // First pass caps journals at ceil(6/3)=2 per type, then fills by
        // priority up to 6.
        assert_eq!(outcome.sources.len(), 6);
        assert!(outcome.sources.iter().any(|s| s.source_type == "course"));
    }

    #[tokio::test]
    async fn test_low_diversity_recommendation() {
        let client = ScriptedClient::new()
            .with(SourceProvider::SemanticScholar, vec![good_paper("only")]);
        let limiter = RateLimiter::new();
        let breakers = BreakerRegistry::new();

        let outcome = discover_sources_for_domain(
            &client,
            &limiter,
            &breakers,
            None,
            "X",
            10,
            None,
            Some(&[ProviderPool::Academic]),
        )
        .await
        .unwrap();
        assert!(outcome
            .recommendations
            .iter()
            .any(|r| r.contains("Low source diversity")));
    }

    #[test]
    fn test_parse_query_array() {
        let content = "Here you go:\n[\"linear algebra textbook\", \"matrix theory course\"]";
        let queries = parse_query_array(content);
        assert_eq!(queries.len(), 2);
        assert!(parse_query_array("no json here").is_empty());
    }

    #[tokio::test]
    async fn test_deterministic_queries() {
        let queries = generate_search_queries("Machine Learning Theory", None).await;
        assert!(queries.contains(&"Machine Learning Theory".to_string()));
        assert!(queries.contains(&"Machine Learning".to_string()));
        assert!(queries.contains(&"Machine".to_string()));
        // Deduped
        let unique: std::collections::HashSet<_> =
            queries.iter().map(|q| q.to_lowercase()).collect();
        assert_eq!(unique.len(), queries.len());
    }
}
