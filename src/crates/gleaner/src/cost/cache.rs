//! TTL cache for fetched documents, embeddings, source scores, and
//! extraction results.
//!
//! Keys are SHA-256 over `cache_type | args | sorted kwargs`. The map is
//! process-local; the interface permits substitution by an external store
//! without API changes.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default TTLs per cache type.
fn default_ttl(cache_type: &str) -> Duration {
    match cache_type {
        "fetched_doc" => Duration::from_secs(86_400),      // 24h
        "cleaned_text" => Duration::from_secs(86_400),     // 24h
        "embedding" => Duration::from_secs(604_800),       // 7d
        "source_score" => Duration::from_secs(3_600),      // 1h
        "extraction_result" => Duration::from_secs(86_400), // 24h
        _ => Duration::from_secs(3_600),
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

/// In-memory TTL cache.
#[derive(Clone, Default)]
pub struct CostCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl CostCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_key(cache_type: &str, args: &[&str], kwargs: &[(&str, &str)]) -> String {
        let mut parts = vec![cache_type.to_string()];
        if !args.is_empty() {
            parts.push(args.join(","));
        }
        if !kwargs.is_empty() {
            let mut sorted: Vec<_> = kwargs.to_vec();
            sorted.sort_by_key(|(k, _)| *k);
            parts.push(
                sorted
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }
        let key_str = parts.join("|");
        let mut hasher = Sha256::new();
        hasher.update(key_str.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Get a cached value. Returns None on miss or expiry; expired entries
    /// are evicted lazily.
    pub fn get(&self, cache_type: &str, args: &[&str]) -> Option<Value> {
        self.get_kw(cache_type, args, &[])
    }

    /// Get with keyword-style key parts.
    pub fn get_kw(
        &self,
        cache_type: &str,
        args: &[&str],
        kwargs: &[(&str, &str)],
    ) -> Option<Value> {
        let key = Self::make_key(cache_type, args, kwargs);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(&key);
                None
            }
            Some(entry) => {
                debug!(cache_type = %cache_type, "Cache hit");
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    /// Store a value with the default TTL for its cache type.
    pub fn set(&self, cache_type: &str, value: Value, args: &[&str]) {
        self.set_kw(cache_type, value, None, args, &[]);
    }

    /// Store with an explicit TTL and keyword-style key parts.
    pub fn set_kw(
        &self,
        cache_type: &str,
        value: Value,
        ttl: Option<Duration>,
        args: &[&str],
        kwargs: &[(&str, &str)],
    ) {
        let ttl = ttl.unwrap_or_else(|| default_ttl(cache_type));
        let key = Self::make_key(cache_type, args, kwargs);
        self.entries.lock().insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Typed get: deserialize the cached JSON value.
    pub fn get_as<T: DeserializeOwned>(&self, cache_type: &str, args: &[&str]) -> Option<T> {
        self.get(cache_type, args)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Typed set: serialize the value to JSON before storing.
    pub fn set_as<T: Serialize>(&self, cache_type: &str, value: &T, args: &[&str]) {
        if let Ok(v) = serde_json::to_value(value) {
            self.set(cache_type, v, args);
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Cache statistics.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        let total = entries.len();
        let expired = entries.values().filter(|e| e.is_expired()).count();
        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}
