//! The diff wire format: a proposed or committed set of node/edge additions,
//! updates and deletions with metadata.
//!
//! Readers accept unknown property keys; writers attach `_provenance` to
//! every created or updated node and edge (see [`crate::provenance`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A graph node as it appears in diffs and agent outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: Map::new(),
        }
    }

    /// String property lookup, None when absent or non-string.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    pub fn set_prop(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }
}

/// A graph edge as it appears in diffs and agent outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Edge {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        edge_type: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            edge_type: edge_type.into(),
            properties: Map::new(),
        }
    }
}

/// The add/update/delete buckets for one element kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffOps<T> {
    #[serde(default = "Vec::new")]
    pub add: Vec<T>,
    #[serde(default = "Vec::new")]
    pub update: Vec<T>,
    #[serde(default = "Vec::new")]
    pub delete: Vec<T>,
}

// Not derived: the derive would require `T: Default`, and elements have no
// meaningful default.
impl<T> Default for DiffOps<T> {
    fn default() -> Self {
        Self {
            add: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<T> DiffOps<T> {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Diff metadata: when and why the change was proposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_at: Option<DateTime<Utc>>,
}

impl Default for DiffMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            source: None,
            reason: None,
            provenance_agent: None,
            provenance_at: None,
        }
    }
}

/// A proposed or committed set of graph mutations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub nodes: DiffOps<Node>,
    #[serde(default)]
    pub edges: DiffOps<Edge>,
    #[serde(default)]
    pub metadata: DiffMetadata,
}

impl Diff {
    /// An empty diff stamped with the current time.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Total element count across all buckets.
    pub fn total_operations(&self) -> usize {
        self.nodes.add.len()
            + self.nodes.update.len()
            + self.nodes.delete.len()
            + self.edges.add.len()
            + self.edges.update.len()
            + self.edges.delete.len()
    }
}

/// Generate a unique diff ID.
pub fn create_diff_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format a diff into the human-readable counts string used in approval
/// prompts and changelog summaries, e.g. `"+1 nodes, +2 edges"`.
pub fn format_diff_summary(diff: &Diff) -> String {
    let mut parts = Vec::new();
    let buckets = [
        ("+", diff.nodes.add.len(), "nodes"),
        ("~", diff.nodes.update.len(), "nodes"),
        ("-", diff.nodes.delete.len(), "nodes"),
        ("+", diff.edges.add.len(), "edges"),
        ("~", diff.edges.update.len(), "edges"),
        ("-", diff.edges.delete.len(), "edges"),
    ];
    for (sign, count, what) in buckets {
        if count > 0 {
            parts.push(format!("{}{} {}", sign, count, what));
        }
    }
    if parts.is_empty() {
        "No changes".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_diff() -> Diff {
        let mut node = Node::new("C:123e4567-e89b-12d3-a456-426614174000", "Concept");
        node.set_prop("name", json!("photosynthesis"));
        let edge = Edge::new(
            "CL:123e4567-e89b-12d3-a456-426614174001",
            "C:123e4567-e89b-12d3-a456-426614174000",
            "DEFINES",
        );
        let mut diff = Diff::empty();
        diff.nodes.add.push(node);
        diff.edges.add.push(edge);
        diff.metadata.source = Some("topic=photosynthesis".to_string());
        diff
    }

    #[test]
    fn test_serde_roundtrip() {
        let diff = sample_diff();
        let json = serde_json::to_string(&diff).unwrap();
        let parsed: Diff = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, diff);
    }

    #[test]
    fn test_reader_accepts_missing_buckets_and_extra_keys() {
        let json = json!({
            "nodes": {"add": [{"id": "C:123e4567-e89b-12d3-a456-426614174000",
                               "label": "Concept",
                               "properties": {"name": "x", "unexpected": [1, 2]}}]},
            "edges": {},
            "metadata": {"created_at": "2024-01-01T00:00:00Z", "custom": true}
        });
        let diff: Diff = serde_json::from_value(json).unwrap();
        assert_eq!(diff.nodes.add.len(), 1);
        assert!(diff.nodes.update.is_empty());
        assert!(diff.edges.add.is_empty());
        assert!(diff.nodes.add[0].properties.contains_key("unexpected"));
    }

    #[test]
    fn test_edge_type_field_named_type_on_wire() {
        let edge = Edge::new("a", "b", "SUPPORTS");
        let v = serde_json::to_value(&edge).unwrap();
        assert_eq!(v["type"], "SUPPORTS");
        assert_eq!(v["from"], "a");
    }

    #[test]
    fn test_summary_counts() {
        let diff = sample_diff();
        assert_eq!(format_diff_summary(&diff), "+1 nodes, +1 edges");
        assert_eq!(format_diff_summary(&Diff::empty()), "No changes");
    }

    #[test]
    fn test_total_operations() {
        let mut diff = sample_diff();
        diff.nodes.delete.push(Node::new("C:xxx", "Concept"));
        assert_eq!(diff.total_operations(), 3);
        assert!(!diff.is_empty());
        assert!(Diff::empty().is_empty());
    }
}
