//! Search provider clients.
//!
//! Providers are grouped in three pools (academic, educational, general) and
//! queried over plain HTTP APIs. The trait boundary lets tests substitute a
//! scripted client; rate limiting and circuit breaking happen in the
//! discovery layer, not here.

use crate::error::{GleanerError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "gleaner-kg/0.1 (knowledge graph ingestion; +https://github.com/gleaner-kg/gleaner)";

/// Provider pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPool {
    Academic,
    Educational,
    General,
}

/// The search providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceProvider {
    SemanticScholar,
    Arxiv,
    OpenAlex,
    OpenStax,
    KhanAcademy,
    MitOcw,
    Wikipedia,
}

impl SourceProvider {
    pub const ALL: [SourceProvider; 7] = [
        SourceProvider::SemanticScholar,
        SourceProvider::Arxiv,
        SourceProvider::OpenAlex,
        SourceProvider::OpenStax,
        SourceProvider::KhanAcademy,
        SourceProvider::MitOcw,
        SourceProvider::Wikipedia,
    ];

    /// Key used for rate limiting and circuit breaking.
    pub fn key(&self) -> &'static str {
        match self {
            SourceProvider::SemanticScholar => "semantic_scholar",
            SourceProvider::Arxiv => "arxiv",
            SourceProvider::OpenAlex => "openalex",
            SourceProvider::OpenStax => "openstax",
            SourceProvider::KhanAcademy => "khan_academy",
            SourceProvider::MitOcw => "mit_ocw",
            SourceProvider::Wikipedia => "wikipedia",
        }
    }

    pub fn pool(&self) -> ProviderPool {
        match self {
            SourceProvider::SemanticScholar | SourceProvider::Arxiv | SourceProvider::OpenAlex => {
                ProviderPool::Academic
            }
            SourceProvider::OpenStax | SourceProvider::KhanAcademy | SourceProvider::MitOcw => {
                ProviderPool::Educational
            }
            SourceProvider::Wikipedia => ProviderPool::General,
        }
    }

    pub fn in_pool(pool: ProviderPool) -> Vec<SourceProvider> {
        Self::ALL.iter().copied().filter(|p| p.pool() == pool).collect()
    }
}

/// A discovered source before and after scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub title: String,
    pub url: Option<String>,
    /// Source type label, e.g. "peer_reviewed_journal", "preprint",
    /// "encyclopedia", "course", "textbook".
    pub source_type: String,
    /// Provider key that found this source.
    pub provider: String,
    pub domain: Option<String>,
    pub year: Option<i32>,
    pub citation_count: Option<u64>,
    pub doi: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    // Filled in by scoring.
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub cost_score: f64,
    #[serde(default)]
    pub priority_score: f64,
    #[serde(default)]
    pub cost_tier: String,
    /// Non-fatal fetch/discovery annotation (e.g. paywall).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceCandidate {
    pub fn new(title: &str, provider: SourceProvider, source_type: &str) -> Self {
        Self {
            title: title.to_string(),
            provider: provider.key().to_string(),
            source_type: source_type.to_string(),
            ..Self::default()
        }
    }

    /// True when the source carries a primary identifier (DOI or arXiv id).
    pub fn has_primary_id(&self) -> bool {
        self.doi.is_some()
            || self
                .url
                .as_deref()
                .map(|u| u.contains("arxiv.org/abs/"))
                .unwrap_or(false)
    }
}

/// Search client boundary; tests substitute a scripted implementation.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn search(
        &self,
        provider: SourceProvider,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SourceCandidate>>;
}

/// Real HTTP client against the provider APIs.
pub struct HttpProviderClient {
    client: reqwest::Client,
}

impl Default for HttpProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProviderClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GleanerError::Other(format!("Search request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(GleanerError::Other(format!(
                "Search returned HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| GleanerError::Other(format!("Search response invalid: {}", e)))
    }

    async fn search_semantic_scholar(&self, query: &str, limit: usize) -> Result<Vec<SourceCandidate>> {
        let url = format!(
            "https://api.semanticscholar.org/graph/v1/paper/search?query={}&limit={}&fields=title,year,citationCount,externalIds,url,authors",
            urlencoding::encode(query),
            limit
        );
        let body = self.get_json(&url).await?;
        let mut sources = Vec::new();
        for paper in body["data"].as_array().into_iter().flatten() {
            let Some(title) = paper["title"].as_str() else {
                continue;
            };
            let mut candidate =
                SourceCandidate::new(title, SourceProvider::SemanticScholar, "peer_reviewed_journal");
            candidate.url = paper["url"].as_str().map(String::from);
            candidate.year = paper["year"].as_i64().map(|y| y as i32);
            candidate.citation_count = paper["citationCount"].as_u64();
            candidate.doi = paper["externalIds"]["DOI"].as_str().map(String::from);
            candidate.authors = paper["authors"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|a| a["name"].as_str())
                .map(String::from)
                .collect();
            sources.push(candidate);
        }
        Ok(sources)
    }

    async fn search_arxiv(&self, query: &str, limit: usize) -> Result<Vec<SourceCandidate>> {
        let url = format!(
            "https://export.arxiv.org/api/query?search_query=all:{}&max_results={}",
            urlencoding::encode(query),
            limit
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GleanerError::Other(format!("Search request failed: {}", e)))?;
        let body = response
            .text()
            .await
            .map_err(|e| GleanerError::Other(format!("Search response invalid: {}", e)))?;
        Ok(parse_arxiv_feed(&body, limit))
    }

    async fn search_openalex(&self, query: &str, limit: usize) -> Result<Vec<SourceCandidate>> {
        let url = format!(
            "https://api.openalex.org/works?search={}&per-page={}",
            urlencoding::encode(query),
            limit
        );
        let body = self.get_json(&url).await?;
        let mut sources = Vec::new();
        for work in body["results"].as_array().into_iter().flatten() {
            let Some(title) = work["title"].as_str() else {
                continue;
            };
            let mut candidate =
                SourceCandidate::new(title, SourceProvider::OpenAlex, "peer_reviewed_journal");
            candidate.url = work["id"].as_str().map(String::from);
            candidate.year = work["publication_year"].as_i64().map(|y| y as i32);
            candidate.citation_count = work["cited_by_count"].as_u64();
            candidate.doi = work["doi"].as_str().map(|d| {
                d.trim_start_matches("https://doi.org/").to_string()
            });
            sources.push(candidate);
        }
        Ok(sources)
    }

    async fn search_wikipedia(&self, query: &str, limit: usize) -> Result<Vec<SourceCandidate>> {
        let url = format!(
            "https://en.wikipedia.org/w/api.php?action=opensearch&search={}&limit={}&format=json",
            urlencoding::encode(query),
            limit
        );
        let body = self.get_json(&url).await?;
        // opensearch format: [query, [titles], [descriptions], [urls]]
        let titles = body[1].as_array().cloned().unwrap_or_default();
        let urls = body[3].as_array().cloned().unwrap_or_default();
        let mut sources = Vec::new();
        for (i, title) in titles.iter().enumerate() {
            let Some(title) = title.as_str() else { continue };
            let mut candidate =
                SourceCandidate::new(title, SourceProvider::Wikipedia, "encyclopedia");
            candidate.url = urls.get(i).and_then(|u| u.as_str()).map(String::from);
            sources.push(candidate);
        }
        Ok(sources)
    }

    /// Educational providers have no search API; construct catalog/search
    /// URLs for the query the way their sites expose them.
    fn educational_sources(
        provider: SourceProvider,
        query: &str,
        limit: usize,
    ) -> Vec<SourceCandidate> {
        let (source_type, url) = match provider {
            SourceProvider::OpenStax => (
                "textbook",
                format!("https://openstax.org/search?q={}", urlencoding::encode(query)),
            ),
            SourceProvider::KhanAcademy => (
                "course",
                format!(
                    "https://www.khanacademy.org/search?page_search_query={}",
                    urlencoding::encode(query)
                ),
            ),
            SourceProvider::MitOcw => (
                "course",
                format!("https://ocw.mit.edu/search/?q={}", urlencoding::encode(query)),
            ),
            _ => return Vec::new(),
        };
        let mut candidate = SourceCandidate::new(
            &format!("{} ({})", query, provider.key()),
            provider,
            source_type,
        );
        candidate.url = Some(url);
        vec![candidate].into_iter().take(limit).collect()
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn search(
        &self,
        provider: SourceProvider,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SourceCandidate>> {
        debug!(provider = provider.key(), query = %query, "Provider search");
        match provider {
            SourceProvider::SemanticScholar => self.search_semantic_scholar(query, limit).await,
            SourceProvider::Arxiv => self.search_arxiv(query, limit).await,
            SourceProvider::OpenAlex => self.search_openalex(query, limit).await,
            SourceProvider::Wikipedia => self.search_wikipedia(query, limit).await,
            SourceProvider::OpenStax | SourceProvider::KhanAcademy | SourceProvider::MitOcw => {
                Ok(Self::educational_sources(provider, query, limit))
            }
        }
    }
}

fn arxiv_entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<entry>(.*?)</entry>").expect("hard-coded regex"))
}

fn arxiv_field_re(field: &'static str) -> Regex {
    Regex::new(&format!(r"(?s)<{field}>(.*?)</{field}>")).expect("hard-coded regex")
}

/// Minimal Atom parsing for the arXiv API: title, id link, published year.
fn parse_arxiv_feed(feed: &str, limit: usize) -> Vec<SourceCandidate> {
    let title_re = arxiv_field_re("title");
    let id_re = arxiv_field_re("id");
    let published_re = arxiv_field_re("published");

    let mut sources = Vec::new();
    for entry in arxiv_entry_re().captures_iter(feed).take(limit) {
        let body = &entry[1];
        let Some(title) = title_re.captures(body).map(|c| c[1].trim().to_string()) else {
            continue;
        };
        let mut candidate = SourceCandidate::new(&title, SourceProvider::Arxiv, "preprint");
        candidate.url = id_re.captures(body).map(|c| c[1].trim().to_string());
        candidate.year = published_re
            .captures(body)
            .and_then(|c| c[1].get(..4).and_then(|y| y.parse().ok()));
        sources.push(candidate);
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_pools() {
        assert_eq!(SourceProvider::Arxiv.pool(), ProviderPool::Academic);
        assert_eq!(SourceProvider::KhanAcademy.pool(), ProviderPool::Educational);
        assert_eq!(SourceProvider::Wikipedia.pool(), ProviderPool::General);
        assert_eq!(ProviderPool::Academic, SourceProvider::in_pool(ProviderPool::Academic)[0].pool());
        assert_eq!(SourceProvider::in_pool(ProviderPool::Educational).len(), 3);
    }

    #[test]
    fn test_parse_arxiv_feed() {
        let feed = r#"<feed>
            <entry>
                <id>http://arxiv.org/abs/2401.00001v1</id>
                <title>Attention Is Not All You Need</title>
                <published>2024-01-01T00:00:00Z</published>
            </entry>
            <entry>
                <id>http://arxiv.org/abs/2302.00002v2</id>
                <title>Second Paper</title>
                <published>2023-02-01T00:00:00Z</published>
            </entry>
        </feed>"#;
        let sources = parse_arxiv_feed(feed, 5);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Attention Is Not All You Need");
        assert_eq!(sources[0].year, Some(2024));
        assert!(sources[0].url.as_deref().unwrap().contains("arxiv.org/abs"));
        assert!(sources[0].has_primary_id());
    }

    #[test]
    fn test_parse_arxiv_feed_respects_limit() {
        let feed = "<entry><id>x</id><title>A</title></entry>".repeat(10);
        assert_eq!(parse_arxiv_feed(&feed, 3).len(), 3);
    }

    #[test]
    fn test_primary_id_detection() {
        let mut candidate = SourceCandidate::new("t", SourceProvider::OpenAlex, "journal");
        assert!(!candidate.has_primary_id());
        candidate.doi = Some("10.1234/abc".to_string());
        assert!(candidate.has_primary_id());
    }

    #[test]
    fn test_educational_sources_construct_urls() {
        let sources =
            HttpProviderClient::educational_sources(SourceProvider::MitOcw, "physics", 3);
        assert_eq!(sources.len(), 1);
        assert!(sources[0].url.as_deref().unwrap().contains("ocw.mit.edu"));
        assert_eq!(sources[0].source_type, "course");
    }
}
