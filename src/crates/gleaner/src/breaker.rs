//! Circuit breakers for domains and upstream sources.
//!
//! Finite-state machine per key: closed (requests allowed), open (denied),
//! half-open (one probe allowed). The breaker is consulted before dispatching
//! to a provider and never inside I/O; success/failure is recorded after the
//! I/O completes.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Open after this many failures inside the window.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 5;
/// Failure-counting window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Time in open before allowing a probe.
pub const DEFAULT_RECOVERY: Duration = Duration::from_secs(30);

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStateKind {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStateKind::Closed => "closed",
            CircuitStateKind::Open => "open",
            CircuitStateKind::HalfOpen => "half_open",
        }
    }
}

/// Snapshot of one circuit for telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub key: String,
    pub state: CircuitStateKind,
    pub failure_count: usize,
    pub seconds_since_last_failure: Option<f64>,
}

/// Breaker parameters.
#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    pub failure_threshold: usize,
    pub window: Duration,
    pub recovery: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            window: DEFAULT_WINDOW,
            recovery: DEFAULT_RECOVERY,
        }
    }
}

/// State for a single circuit (domain or source).
#[derive(Debug)]
struct Circuit {
    key: String,
    config: CircuitConfig,
    state: CircuitStateKind,
    failures: Vec<Instant>,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
}

impl Circuit {
    fn new(key: String, config: CircuitConfig) -> Self {
        Self {
            key,
            config,
            state: CircuitStateKind::Closed,
            failures: Vec::new(),
            last_failure_at: None,
            opened_at: None,
        }
    }

    fn allow_request(&mut self) -> bool {
        let now = Instant::now();
        match self.state {
            CircuitStateKind::Closed => true,
            CircuitStateKind::Open => {
                if let Some(opened_at) = self.opened_at {
                    if now.duration_since(opened_at) >= self.config.recovery {
                        self.state = CircuitStateKind::HalfOpen;
                        self.opened_at = None;
                        info!(circuit = %self.key, "Circuit open -> half_open (probe)");
                        return true;
                    }
                }
                false
            }
            // Half-open: allow one request to test recovery.
            CircuitStateKind::HalfOpen => true,
        }
    }

    fn record_success(&mut self) {
        match self.state {
            CircuitStateKind::HalfOpen => {
                self.state = CircuitStateKind::Closed;
                self.failures.clear();
                info!(circuit = %self.key, "Circuit half_open -> closed (recovered)");
            }
            CircuitStateKind::Closed => {
                let now = Instant::now();
                let window = self.config.window;
                self.failures.retain(|t| now.duration_since(*t) < window);
            }
            CircuitStateKind::Open => {}
        }
    }

    fn record_failure(&mut self) {
        let now = Instant::now();
        self.last_failure_at = Some(now);
        self.failures.push(now);
        let window = self.config.window;
        self.failures.retain(|t| now.duration_since(*t) < window);

        match self.state {
            CircuitStateKind::HalfOpen => {
                self.state = CircuitStateKind::Open;
                self.opened_at = Some(now);
                warn!(circuit = %self.key, "Circuit half_open -> open (probe failed)");
            }
            CircuitStateKind::Closed => {
                if self.failures.len() >= self.config.failure_threshold {
                    self.state = CircuitStateKind::Open;
                    self.opened_at = Some(now);
                    warn!(
                        circuit = %self.key,
                        failures = self.failures.len(),
                        "Circuit closed -> open"
                    );
                }
            }
            CircuitStateKind::Open => {}
        }
    }

    fn force_open(&mut self) {
        self.state = CircuitStateKind::Open;
        self.opened_at = Some(Instant::now());
        info!(circuit = %self.key, "Circuit forced open");
    }

    fn force_close(&mut self) {
        self.state = CircuitStateKind::Closed;
        self.failures.clear();
        self.opened_at = None;
        info!(circuit = %self.key, "Circuit forced closed");
    }

    fn status(&self) -> CircuitStatus {
        CircuitStatus {
            key: self.key.clone(),
            state: self.state,
            failure_count: self.failures.len(),
            seconds_since_last_failure: self
                .last_failure_at
                .map(|t| Instant::now().duration_since(t).as_secs_f64()),
        }
    }
}

/// Registry of circuit breakers keyed per domain and per source.
#[derive(Clone, Default)]
pub struct BreakerRegistry {
    inner: Arc<Mutex<BreakerMaps>>,
}

#[derive(Default)]
struct BreakerMaps {
    by_domain: HashMap<String, Circuit>,
    by_source: HashMap<String, Circuit>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_domain<R>(&self, domain: &str, f: impl FnOnce(&mut Circuit) -> R) -> R {
        let mut maps = self.inner.lock();
        let circuit = maps
            .by_domain
            .entry(domain.to_string())
            .or_insert_with(|| {
                Circuit::new(format!("domain:{}", domain), CircuitConfig::default())
            });
        f(circuit)
    }

    fn with_source<R>(&self, source: &str, f: impl FnOnce(&mut Circuit) -> R) -> R {
        let mut maps = self.inner.lock();
        let circuit = maps
            .by_source
            .entry(source.to_string())
            .or_insert_with(|| {
                Circuit::new(format!("source:{}", source), CircuitConfig::default())
            });
        f(circuit)
    }

    /// Check before running domain-scoped work. False means paused.
    pub fn allow_domain(&self, domain: &str) -> bool {
        self.with_domain(domain, |c| c.allow_request())
    }

    /// Check before calling an upstream source. False means paused.
    pub fn allow_source(&self, source: &str) -> bool {
        self.with_source(source, |c| c.allow_request())
    }

    pub fn record_domain_success(&self, domain: &str) {
        self.with_domain(domain, |c| c.record_success());
    }

    pub fn record_domain_failure(&self, domain: &str) {
        self.with_domain(domain, |c| c.record_failure());
    }

    pub fn record_source_success(&self, source: &str) {
        self.with_source(source, |c| c.record_success());
    }

    pub fn record_source_failure(&self, source: &str) {
        self.with_source(source, |c| c.record_failure());
    }

    /// Kill switch: pause a domain immediately.
    pub fn pause_domain(&self, domain: &str) {
        self.with_domain(domain, |c| c.force_open());
    }

    /// Kill switch: pause a source immediately.
    pub fn pause_source(&self, source: &str) {
        self.with_source(source, |c| c.force_open());
    }

    pub fn resume_domain(&self, domain: &str) {
        self.with_domain(domain, |c| c.force_close());
    }

    pub fn resume_source(&self, source: &str) {
        self.with_source(source, |c| c.force_close());
    }

    /// Status of every circuit, for telemetry.
    pub fn list_status(&self) -> BreakerStatusSnapshot {
        let maps = self.inner.lock();
        BreakerStatusSnapshot {
            domains: maps.by_domain.values().map(|c| c.status()).collect(),
            sources: maps.by_source.values().map(|c| c.status()).collect(),
        }
    }
}

/// Full breaker status for telemetry.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BreakerStatusSnapshot {
    pub domains: Vec<CircuitStatus>,
    pub sources: Vec<CircuitStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_registry() -> BreakerRegistry {
        let registry = BreakerRegistry::new();
        // Install circuits with short recovery for tests.
        {
            let mut maps = registry.inner.lock();
            maps.by_source.insert(
                "fast".to_string(),
                Circuit::new(
                    "source:fast".to_string(),
                    CircuitConfig {
                        failure_threshold: 3,
                        window: Duration::from_secs(60),
                        recovery: Duration::from_millis(50),
                    },
                ),
            );
        }
        registry
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let registry = BreakerRegistry::new();
        assert!(registry.allow_source("arxiv"));

        for _ in 0..DEFAULT_FAILURE_THRESHOLD {
            registry.record_source_failure("arxiv");
        }
        assert!(!registry.allow_source("arxiv"));

        let status = registry.list_status();
        let arxiv = status.sources.iter().find(|s| s.key == "source:arxiv");
        assert_eq!(arxiv.unwrap().state, CircuitStateKind::Open);
    }

    #[test]
    fn test_below_threshold_stays_closed() {
        let registry = BreakerRegistry::new();
        for _ in 0..DEFAULT_FAILURE_THRESHOLD - 1 {
            registry.record_source_failure("arxiv");
        }
        assert!(registry.allow_source("arxiv"));
    }

    #[tokio::test]
    async fn test_half_open_after_recovery_then_close_on_success() {
        let registry = fast_registry();
        for _ in 0..3 {
            registry.record_source_failure("fast");
        }
        assert!(!registry.allow_source("fast"));

        tokio::time::sleep(Duration::from_millis(60)).await;

        // Probe allowed after recovery elapses.
        assert!(registry.allow_source("fast"));
        registry.record_source_success("fast");

        let status = registry.list_status();
        let fast = status.sources.iter().find(|s| s.key == "source:fast");
        assert_eq!(fast.unwrap().state, CircuitStateKind::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let registry = fast_registry();
        for _ in 0..3 {
            registry.record_source_failure("fast");
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.allow_source("fast"));

        registry.record_source_failure("fast");
        assert!(!registry.allow_source("fast"));
    }

    #[test]
    fn test_kill_switches() {
        let registry = BreakerRegistry::new();
        registry.pause_domain("Algebra");
        assert!(!registry.allow_domain("Algebra"));
        registry.resume_domain("Algebra");
        assert!(registry.allow_domain("Algebra"));
    }

    #[test]
    fn test_domains_and_sources_independent() {
        let registry = BreakerRegistry::new();
        registry.pause_domain("arxiv");
        assert!(registry.allow_source("arxiv"));
    }
}
