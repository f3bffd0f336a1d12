//! Source content fetching with sanitization, paywall detection, caching,
//! and a tolerant HTML extractor that never raises.

use crate::cost::cache::CostCache;
use crate::security::network::NetworkAllowlist;
use crate::security::paywall::detect_paywall;
use crate::security::sanitize::{sanitize_content, ContentType};
use crate::sources::providers::SourceCandidate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONCURRENT_FETCHES: usize = 5;
const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; GleanerBot/1.0; +https://github.com/gleaner-kg/gleaner)";

/// Result of fetching one source URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub content: Option<String>,
    pub accessible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paywall_confidence: Option<f64>,
    #[serde(default)]
    pub content_length: usize,
    /// True when only the fallback tag-stripper could parse the page.
    #[serde(default)]
    pub degraded_parse: bool,
}

impl FetchResult {
    fn inaccessible(url: &str, error: &str) -> Self {
        Self {
            url: url.to_string(),
            accessible: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Gather statistics for a fetch batch.
#[derive(Debug, Clone, Serialize)]
pub struct GatherStats {
    pub total_sources: usize,
    pub successful_fetches: usize,
    pub failed_fetches: usize,
    pub free_sources: usize,
    pub paid_sources: usize,
    pub total_content_length: usize,
    pub average_quality: f64,
}

/// Result of gathering content from a ranked source list.
#[derive(Debug, Clone, Serialize)]
pub struct GatherOutcome {
    pub domain: String,
    pub fetched: Vec<(SourceCandidate, FetchResult)>,
    pub statistics: GatherStats,
    pub recommendations: Vec<String>,
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("hard-coded regex"))
}

fn block_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</(?:p|div|h[1-6]|li|tr|br)>|<br\s*/?>").expect("hard-coded regex")
    })
}

/// Extract readable text from HTML. The primary pass preserves block
/// boundaries; when it produces nothing usable the minimal tag-stripper
/// fallback runs. Never errors: worst case is truncated best-effort text.
pub fn extract_text_from_html(html: &str) -> (String, bool) {
    // Primary: drop active content, keep block structure as newlines.
    let cleaned = crate::security::sanitize::strip_scripts_and_style(html);
    let cleaned = crate::security::sanitize::strip_html_comments(&cleaned);
    let with_breaks = block_tag_re().replace_all(&cleaned, "\n");
    let text = tag_re().replace_all(&with_breaks, " ");
    let text = decode_basic_entities(&text);
    let normalized: String = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if !normalized.trim().is_empty() {
        return (normalized, false);
    }

    // Fallback: plain tag strip.
    let stripped = tag_re().replace_all(html, " ");
    let stripped = decode_basic_entities(&stripped);
    (stripped.split_whitespace().collect::<Vec<_>>().join(" "), true)
}

fn decode_basic_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Fetch content from a source URL.
///
/// Order of checks: egress allowlist, cache, HTTP GET (one transient
/// retry), paywall detection, HTML extraction, sanitization, cache store.
pub async fn fetch_source_content(
    http: &reqwest::Client,
    allowlist: &NetworkAllowlist,
    cache: &CostCache,
    url: &str,
    max_length: usize,
) -> FetchResult {
    if !allowlist.is_url_allowed(url) {
        return FetchResult::inaccessible(url, "URL not in network allowlist");
    }

    let max_len_key = max_length.to_string();
    let cache_args = [url, max_len_key.as_str()];
    if let Some(cached) = cache.get_as::<FetchResult>("fetched_doc", &cache_args) {
        return cached;
    }

    let response = tooling::retry::with_retry(
        &tooling::retry::RetryConfig::single(),
        "fetch_source",
        || async {
            http.get(url)
                .header("User-Agent", USER_AGENT)
                .header(
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                )
                .timeout(FETCH_TIMEOUT)
                .send()
                .await
        },
        |e: &reqwest::Error| e.is_timeout() || e.is_connect(),
    )
    .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "Fetch failed");
            return FetchResult::inaccessible(url, &format!("Request failed: {}", e));
        }
    };

    let status = response.status().as_u16();
    if status != 200 {
        let mut result = FetchResult::inaccessible(url, &format!("HTTP {}", status));
        result.status = Some(status);
        return result;
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return FetchResult::inaccessible(url, &format!("Body read failed: {}", e)),
    };

    let paywall = detect_paywall(&body, Some(url));
    if paywall.is_paywall {
        let mut result = FetchResult::inaccessible(url, "Paywall detected");
        result.status = Some(status);
        result.paywall_confidence = Some(paywall.confidence);
        return result;
    }

    let (text, degraded) = extract_text_from_html(&body);
    let sanitized = sanitize_content(&text, ContentType::Text, max_length);

    let result = FetchResult {
        url: url.to_string(),
        content_length: sanitized.chars().count(),
        content: Some(sanitized),
        accessible: true,
        status: Some(status),
        error: None,
        paywall_confidence: None,
        degraded_parse: degraded,
    };
    cache.set_as("fetched_doc", &result, &cache_args);
    result
}

/// Fetch content from ranked sources in priority order, bounded by a
/// concurrency semaphore.
pub async fn gather_domain_content(
    http: &reqwest::Client,
    allowlist: &NetworkAllowlist,
    cache: &CostCache,
    sources: Vec<SourceCandidate>,
    domain: &str,
    max_sources: usize,
    min_priority: f64,
    max_length: usize,
) -> GatherOutcome {
    let eligible: Vec<SourceCandidate> = sources
        .into_iter()
        .filter(|s| s.priority_score >= min_priority)
        .take(max_sources)
        .collect();
    info!(domain = %domain, count = eligible.len(), "Fetching source content");

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES));
    let futures = eligible.into_iter().map(|source| {
        let semaphore = semaphore.clone();
        async move {
            // Semaphore closed is unreachable; treat as denied fetch.
            let Ok(_permit) = semaphore.acquire().await else {
                let url = source.url.clone().unwrap_or_default();
                return (source, FetchResult::inaccessible(&url, "fetch pool closed"));
            };
            let result = match source.url.as_deref() {
                Some(url) => fetch_source_content(http, allowlist, cache, url, max_length).await,
                None => FetchResult::inaccessible("", "No URL provided"),
            };
            (source, result)
        }
    });
    let fetched: Vec<(SourceCandidate, FetchResult)> = futures::future::join_all(futures).await;

    let successful: Vec<&(SourceCandidate, FetchResult)> =
        fetched.iter().filter(|(_, r)| r.accessible).collect();
    let free = successful
        .iter()
        .filter(|(s, _)| s.cost_score == 0.0)
        .count();
    let total_content_length = successful.iter().map(|(_, r)| r.content_length).sum();
    let average_quality = if successful.is_empty() {
        0.0
    } else {
        successful.iter().map(|(s, _)| s.quality_score).sum::<f64>() / successful.len() as f64
    };

    let statistics = GatherStats {
        total_sources: fetched.len(),
        successful_fetches: successful.len(),
        failed_fetches: fetched.len() - successful.len(),
        free_sources: free,
        paid_sources: successful.len() - free,
        total_content_length,
        average_quality,
    };

    let mut recommendations = Vec::new();
    if statistics.failed_fetches > statistics.successful_fetches {
        recommendations
            .push("Many sources failed to fetch. Check URLs and accessibility.".to_string());
    }
    if statistics.successful_fetches > 0 && statistics.average_quality < 0.7 {
        recommendations.push(
            "Average source quality is below optimal. Consider higher quality sources.".to_string(),
        );
    }

    GatherOutcome {
        domain: domain.to_string(),
        fetched,
        statistics,
        recommendations,
    }
}
