//! Per-source rate limiting with sliding minute and hour windows.
//!
//! `check` is advisory and never mutates; callers invoke `record` after a
//! request actually goes out. The limiter never blocks by sleeping.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Per-source request caps.
#[derive(Debug, Clone, Copy)]
pub struct SourceLimits {
    pub requests_per_minute: usize,
    pub requests_per_hour: usize,
}

/// Default limits per provider; unknown sources use `default_limits`.
fn builtin_limits(source: &str) -> SourceLimits {
    match source {
        "semantic_scholar" => SourceLimits {
            requests_per_minute: 100,
            requests_per_hour: 5000,
        },
        "arxiv" => SourceLimits {
            requests_per_minute: 10,
            requests_per_hour: 200,
        },
        "openalex" => SourceLimits {
            requests_per_minute: 50,
            requests_per_hour: 10_000,
        },
        "wikipedia" => SourceLimits {
            requests_per_minute: 200,
            requests_per_hour: 10_000,
        },
        "openstax" => SourceLimits {
            requests_per_minute: 20,
            requests_per_hour: 1000,
        },
        "khan_academy" => SourceLimits {
            requests_per_minute: 30,
            requests_per_hour: 2000,
        },
        "mit_ocw" => SourceLimits {
            requests_per_minute: 20,
            requests_per_hour: 1000,
        },
        _ => default_limits(),
    }
}

fn default_limits() -> SourceLimits {
    SourceLimits {
        requests_per_minute: 10,
        requests_per_hour: 500,
    }
}

/// Rate limiter statistics for one source.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub source: String,
    pub requests_last_minute: usize,
    pub requests_last_hour: usize,
    pub remaining_minute: usize,
    pub remaining_hour: usize,
}

/// Per-source sliding-window rate limiter with a per-domain minute cap.
#[derive(Clone, Default)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterState>>,
}

#[derive(Default)]
struct RateLimiterState {
    /// source -> request timestamps (last hour)
    requests: HashMap<String, Vec<Instant>>,
    /// domain -> request timestamps (last hour)
    domain_requests: HashMap<String, Vec<Instant>>,
    /// configured overrides
    limits: HashMap<String, SourceLimits>,
}

impl RateLimiterState {
    fn trim(&mut self, now: Instant) {
        for timestamps in self.requests.values_mut() {
            timestamps.retain(|t| now.duration_since(*t) < HOUR);
        }
        for timestamps in self.domain_requests.values_mut() {
            timestamps.retain(|t| now.duration_since(*t) < HOUR);
        }
    }

    fn limits_for(&self, source: &str) -> SourceLimits {
        self.limits
            .get(source)
            .copied()
            .unwrap_or_else(|| builtin_limits(source))
    }

    fn count_within(timestamps: Option<&Vec<Instant>>, now: Instant, window: Duration) -> usize {
        timestamps
            .map(|ts| ts.iter().filter(|t| now.duration_since(**t) < window).count())
            .unwrap_or(0)
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the limits for a source.
    pub fn set_limit(&self, source: &str, limits: SourceLimits) {
        self.inner.lock().limits.insert(source.to_string(), limits);
    }

    /// Check whether a request to `source` (optionally for `domain`) is
    /// allowed. Returns `(allowed, reason)`; does not count the request.
    pub fn check(&self, source: &str, domain: Option<&str>) -> (bool, Option<String>) {
        let now = Instant::now();
        let mut state = self.inner.lock();
        state.trim(now);

        let limits = state.limits_for(source);

        let recent_minute =
            RateLimiterState::count_within(state.requests.get(source), now, MINUTE);
        if recent_minute >= limits.requests_per_minute {
            return (
                false,
                Some(format!(
                    "Rate limit exceeded: {}/{} requests per minute for {}",
                    recent_minute, limits.requests_per_minute, source
                )),
            );
        }

        let recent_hour = RateLimiterState::count_within(state.requests.get(source), now, HOUR);
        if recent_hour >= limits.requests_per_hour {
            return (
                false,
                Some(format!(
                    "Rate limit exceeded: {}/{} requests per hour for {}",
                    recent_hour, limits.requests_per_hour, source
                )),
            );
        }

        if let Some(domain) = domain {
            // One domain may not monopolize a source.
            let domain_cap = (limits.requests_per_minute / 2).max(1);
            let domain_recent =
                RateLimiterState::count_within(state.domain_requests.get(domain), now, MINUTE);
            if domain_recent >= domain_cap {
                return (
                    false,
                    Some(format!(
                        "Rate limit exceeded for domain '{}': {}/{} requests per minute",
                        domain, domain_recent, domain_cap
                    )),
                );
            }
        }

        (true, None)
    }

    /// Record a request. Call after a successful `check`.
    pub fn record(&self, source: &str, domain: Option<&str>) {
        let now = Instant::now();
        let mut state = self.inner.lock();
        state
            .requests
            .entry(source.to_string())
            .or_default()
            .push(now);
        if let Some(domain) = domain {
            state
                .domain_requests
                .entry(domain.to_string())
                .or_default()
                .push(now);
        }
    }

    /// Current counts and remaining capacity for a source.
    pub fn stats(&self, source: &str) -> RateLimitStats {
        let now = Instant::now();
        let mut state = self.inner.lock();
        state.trim(now);
        let limits = state.limits_for(source);
        let minute = RateLimiterState::count_within(state.requests.get(source), now, MINUTE);
        let hour = RateLimiterState::count_within(state.requests.get(source), now, HOUR);
        RateLimitStats {
            source: source.to_string(),
            requests_last_minute: minute,
            requests_last_hour: hour,
            remaining_minute: limits.requests_per_minute.saturating_sub(minute),
            remaining_hour: limits.requests_per_hour.saturating_sub(hour),
        }
    }
}
