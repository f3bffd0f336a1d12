//! The graph store boundary.
//!
//! The store is opaque to this system: it applies diffs and answers entity
//! lookups. [`LoggingStore`] is the default stand-in used until a real
//! backend (Neo4j, Postgres) is wired in; it counts operations and remembers
//! entity names so linking and idempotent-commit tests work end to end.

use crate::diff::Diff;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// Per-bucket counts returned from a diff application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Result of applying a diff to the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub success: bool,
    pub nodes: BucketCounts,
    pub edges: BucketCounts,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// The opaque graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Apply a diff. Implementations MERGE on id, so re-applying a committed
    /// diff absorbs duplicates instead of creating new elements.
    async fn apply_diff(&self, diff: &Diff) -> Result<ApplyResult>;

    /// Look up existing entities by name. Returns a map of normalized name to
    /// canonical entity id. Best-effort: failure is non-fatal for callers.
    async fn query_entities(&self, names: &[String]) -> Result<HashMap<String, String>>;
}

/// In-process store stand-in: logs applications, counts buckets, and keeps a
/// name→id index with MERGE-on-id semantics.
#[derive(Debug, Default)]
pub struct LoggingStore {
    state: Mutex<LoggingStoreState>,
}

#[derive(Debug, Default)]
struct LoggingStoreState {
    /// id -> normalized name (when the node has one)
    nodes: HashMap<String, Option<String>>,
    /// normalized name -> id
    by_name: HashMap<String, String>,
}

impl LoggingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nodes currently known to the store.
    pub fn node_count(&self) -> usize {
        self.state.lock().expect("store lock poisoned").nodes.len()
    }
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .trim()
        .replace([' ', '-'], "_")
}

#[async_trait]
impl GraphStore for LoggingStore {
    async fn apply_diff(&self, diff: &Diff) -> Result<ApplyResult> {
        let mut state = self.state.lock().expect("store lock poisoned");
        let mut result = ApplyResult {
            success: true,
            ..Default::default()
        };

        for node in &diff.nodes.add {
            let name = node.prop_str("name").map(normalize_name);
            let existed = state.nodes.insert(node.id.clone(), name.clone()).is_some();
            if let Some(n) = name {
                state.by_name.insert(n, node.id.clone());
            }
            // MERGE on id: a re-applied add updates rather than duplicates.
            if existed {
                result.nodes.updated += 1;
            } else {
                result.nodes.added += 1;
            }
        }
        for node in &diff.nodes.update {
            if state.nodes.contains_key(&node.id) {
                result.nodes.updated += 1;
            }
        }
        for node in &diff.nodes.delete {
            if let Some(name) = state.nodes.remove(&node.id).flatten() {
                state.by_name.remove(&name);
            }
            result.nodes.deleted += 1;
        }

        result.edges.added = diff.edges.add.len();
        result.edges.updated = diff.edges.update.len();
        result.edges.deleted = diff.edges.delete.len();

        info!(
            nodes_added = result.nodes.added,
            nodes_deleted = result.nodes.deleted,
            edges_added = result.edges.added,
            "Applied graph diff"
        );
        debug!(?diff, "Full diff");

        Ok(result)
    }

    async fn query_entities(&self, names: &[String]) -> Result<HashMap<String, String>> {
        let state = self.state.lock().expect("store lock poisoned");
        let mut found = HashMap::new();
        for name in names {
            let normalized = normalize_name(name);
            if let Some(id) = state.by_name.get(&normalized) {
                found.insert(normalized, id.clone());
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Node;
    use serde_json::json;

    fn node_named(id: &str, name: &str) -> Node {
        let mut node = Node::new(id, "Concept");
        node.set_prop("name", json!(name));
        node
    }

    #[tokio::test]
    async fn test_apply_counts_buckets() {
        let store = LoggingStore::new();
        let mut diff = Diff::empty();
        diff.nodes.add.push(node_named("C:a", "Photosynthesis"));
        diff.nodes.add.push(node_named("C:b", "Chlorophyll"));

        let result = store.apply_diff(&diff).await.unwrap();
        assert!(result.success);
        assert_eq!(result.nodes.added, 2);
        assert_eq!(store.node_count(), 2);
    }

    #[tokio::test]
    async fn test_reapply_merges_on_id() {
        let store = LoggingStore::new();
        let mut diff = Diff::empty();
        diff.nodes.add.push(node_named("C:a", "Photosynthesis"));

        let first = store.apply_diff(&diff).await.unwrap();
        assert_eq!(first.nodes.added, 1);

        let second = store.apply_diff(&diff).await.unwrap();
        assert_eq!(second.nodes.added, 0);
        assert_eq!(second.nodes.updated, 1);
        assert_eq!(store.node_count(), 1);
    }

    #[tokio::test]
    async fn test_query_entities_normalizes() {
        let store = LoggingStore::new();
        let mut diff = Diff::empty();
        diff.nodes.add.push(node_named("C:a", "Linear Equations"));
        store.apply_diff(&diff).await.unwrap();

        let found = store
            .query_entities(&["linear equations".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.get("linear_equations").map(String::as_str), Some("C:a"));
        assert!(!found.contains_key("missing"));
    }

    #[tokio::test]
    async fn test_delete_removes_node() {
        let store = LoggingStore::new();
        let mut add = Diff::empty();
        add.nodes.add.push(node_named("C:a", "X"));
        store.apply_diff(&add).await.unwrap();

        let mut del = Diff::empty();
        del.nodes.delete.push(Node::new("C:a", "Concept"));
        let result = store.apply_diff(&del).await.unwrap();
        assert_eq!(result.nodes.deleted, 1);
        assert_eq!(store.node_count(), 0);
    }
}
