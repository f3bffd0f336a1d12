//! Provenance records: every node and edge carries a `_provenance` sub-record
//! so "why does this exist?" is always answerable.

use crate::diff::{Diff, Edge, Node};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum length kept for reasoning/evidence strings.
const MAX_FIELD_LEN: usize = 2000;

/// Provenance metadata attached to nodes and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_summary: Option<String>,
}

impl Provenance {
    /// Build a provenance record for an agent, truncating free-text fields.
    pub fn new(source_agent: impl Into<String>) -> Self {
        Self {
            source_agent: source_agent.into(),
            source_document: None,
            created_at: Utc::now(),
            confidence: 1.0,
            reasoning: None,
            evidence: None,
            last_verified_at: None,
            evidence_summary: None,
        }
    }

    pub fn with_document(mut self, document: Option<&str>) -> Self {
        self.source_document = document.map(|d| d.to_string());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_reasoning(mut self, reasoning: Option<&str>) -> Self {
        self.reasoning = reasoning.map(truncate_field);
        self
    }

    pub fn with_evidence(mut self, evidence: Option<&str>) -> Self {
        self.evidence = evidence.map(truncate_field);
        self
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn truncate_field(s: &str) -> String {
    if s.chars().count() <= MAX_FIELD_LEN {
        s.to_string()
    } else {
        s.chars().take(MAX_FIELD_LEN).collect()
    }
}

/// Attach provenance to a node's properties under `_provenance`.
pub fn attach_to_node(node: &mut Node, provenance: &Provenance) {
    node.properties
        .insert("_provenance".to_string(), provenance.to_value());
}

/// Attach provenance to an edge's properties under `_provenance`.
pub fn attach_to_edge(edge: &mut Edge, provenance: &Provenance) {
    edge.properties
        .insert("_provenance".to_string(), provenance.to_value());
}

/// Add provenance to every node and edge in a diff's add/update buckets and
/// stamp the diff metadata. Call before storing or committing a diff.
pub fn enrich_diff_with_provenance(
    diff: &mut Diff,
    source_agent: &str,
    source_document: Option<&str>,
    reasoning: Option<&str>,
) {
    let provenance = Provenance::new(source_agent)
        .with_document(source_document)
        .with_reasoning(reasoning);

    for node in diff.nodes.add.iter_mut().chain(diff.nodes.update.iter_mut()) {
        attach_to_node(node, &provenance);
    }
    for edge in diff.edges.add.iter_mut().chain(diff.edges.update.iter_mut()) {
        attach_to_edge(edge, &provenance);
    }

    diff.metadata.provenance_agent = Some(source_agent.to_string());
    diff.metadata.provenance_at = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrich_attaches_to_add_and_update() {
        let mut diff = Diff::empty();
        diff.nodes.add.push(Node::new("C:a", "Concept"));
        diff.nodes.update.push(Node::new("C:b", "Concept"));
        diff.nodes.delete.push(Node::new("C:c", "Concept"));
        diff.edges.add.push(Edge::new("C:a", "C:b", "RELATED_TO"));

        enrich_diff_with_provenance(&mut diff, "writer_node", Some("doc"), Some("why"));

        assert!(diff.nodes.add[0].properties.contains_key("_provenance"));
        assert!(diff.nodes.update[0].properties.contains_key("_provenance"));
        assert!(!diff.nodes.delete[0].properties.contains_key("_provenance"));
        assert!(diff.edges.add[0].properties.contains_key("_provenance"));
        assert_eq!(diff.metadata.provenance_agent.as_deref(), Some("writer_node"));
        assert!(diff.metadata.provenance_at.is_some());
    }

    #[test]
    fn test_provenance_source_agent_nonempty() {
        let mut diff = Diff::empty();
        diff.nodes.add.push(Node::new("C:a", "Concept"));
        enrich_diff_with_provenance(&mut diff, "writer_node", None, None);

        let prov = &diff.nodes.add[0].properties["_provenance"];
        assert_eq!(prov["source_agent"], "writer_node");
        assert!(!prov["source_agent"].as_str().unwrap().is_empty());
        assert_eq!(prov["confidence"], 1.0);
    }

    #[test]
    fn test_reasoning_truncated() {
        let long = "r".repeat(5000);
        let p = Provenance::new("agent").with_reasoning(Some(&long));
        assert_eq!(p.reasoning.unwrap().len(), 2000);
    }
}
