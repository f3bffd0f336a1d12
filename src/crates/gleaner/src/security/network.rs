//! Network egress controls: only URLs whose host is on the allowlist may be
//! fetched. No component makes a network call to untrusted hosts without
//! passing this check first.

use parking_lot::RwLock;
use reqwest::Url;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Known-safe academic and educational hosts allowed by default.
const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "api.semanticscholar.org",
    "semanticscholar.org",
    "export.arxiv.org",
    "arxiv.org",
    "api.openalex.org",
    "openalex.org",
    "en.wikipedia.org",
    "www.wikipedia.org",
    "wikipedia.org",
    "openstax.org",
    "www.openstax.org",
    "khanacademy.org",
    "www.khanacademy.org",
    "ocw.mit.edu",
    "libretexts.org",
    "doi.org",
    "crossref.org",
    "api.crossref.org",
];

/// Allowlist of hosts that may be fetched.
#[derive(Clone)]
pub struct NetworkAllowlist {
    hosts: Arc<RwLock<HashSet<String>>>,
}

impl Default for NetworkAllowlist {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkAllowlist {
    /// Allowlist seeded with the built-in hosts.
    pub fn new() -> Self {
        let hosts = DEFAULT_ALLOWED_HOSTS
            .iter()
            .map(|h| h.to_string())
            .collect();
        Self {
            hosts: Arc::new(RwLock::new(hosts)),
        }
    }

    /// Allowlist seeded with the built-ins plus extra hosts (e.g. from
    /// `SECURITY_NETWORK_ALLOWLIST`).
    pub fn with_extra(extra: &[String]) -> Self {
        let allowlist = Self::new();
        for host in extra {
            allowlist.add(host);
        }
        allowlist
    }

    pub fn add(&self, host: &str) {
        let normalized = normalize_host(host);
        if !normalized.is_empty() {
            self.hosts.write().insert(normalized);
        }
    }

    pub fn remove(&self, host: &str) {
        self.hosts.write().remove(&normalize_host(host));
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.read().contains(&normalize_host(host))
    }

    /// True iff the URL's scheme is http/https and its host equals or is a
    /// subdomain of an allowlisted host.
    pub fn is_url_allowed(&self, url: &str) -> bool {
        let allowed = self.check_url(url);
        if !allowed {
            let preview: String = url.chars().take(80).collect();
            warn!(url = %preview, "URL not in allowlist, blocked");
        }
        allowed
    }

    fn check_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = normalize_host(host);

        let hosts = self.hosts.read();
        if hosts.contains(&host) {
            return true;
        }
        // Subdomain match: api.example.org passes when example.org is listed.
        hosts
            .iter()
            .any(|allowed| host.ends_with(&format!(".{}", allowed)))
    }

    pub fn list(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.hosts.read().iter().cloned().collect();
        hosts.sort();
        hosts
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().to_lowercase()
}
