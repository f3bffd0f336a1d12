//! Hypernode and ORP helpers.
//!
//! Hypernodes are plain nodes that group other nodes via CONTAINS edges; the
//! fractal structure lives in `scale` properties and structural edges, never
//! in recursion inside the store.

use crate::diff::Node;
use crate::schema::{generate_id, NodeKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// ORP scale of a node or cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Micro,
    Meso,
    Macro,
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Micro => "micro",
            Scale::Meso => "meso",
            Scale::Macro => "macro",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Scale> {
        match s.to_lowercase().as_str() {
            "micro" => Some(Scale::Micro),
            "meso" => Some(Scale::Meso),
            "macro" => Some(Scale::Macro),
            _ => None,
        }
    }
}

const MACRO_KEYWORDS: [&str; 8] = [
    "domain",
    "hierarchy",
    "system",
    "architecture",
    "framework",
    "meta",
    "overall",
    "global",
];

const MESO_KEYWORDS: [&str; 7] = [
    "cluster",
    "group",
    "subgraph",
    "module",
    "component",
    "gate",
    "circuit",
];

/// Infer the ORP scale from content keywords and batch size.
pub fn infer_scale(content: &str, node_count: usize) -> Scale {
    let content_lower = content.to_lowercase();

    if MACRO_KEYWORDS.iter().any(|kw| content_lower.contains(kw)) || node_count > 50 {
        return Scale::Macro;
    }
    if MESO_KEYWORDS.iter().any(|kw| content_lower.contains(kw))
        || (10..=50).contains(&node_count)
    {
        return Scale::Meso;
    }
    Scale::Micro
}

/// Create a hypernode grouping the given member node IDs.
pub fn create_hypernode(name: &str, scale: Scale, subgraph_nodes: Vec<String>) -> Node {
    let id = generate_id(NodeKind::Hypernode);
    let mut node = Node::new(id, NodeKind::Hypernode.as_str());
    node.set_prop("name", json!(name));
    node.set_prop("scale", json!(scale.as_str()));
    node.set_prop("subgraph_nodes", json!(subgraph_nodes));
    node.set_prop("compression_level", json!(0.5));
    node
}

/// Split a node batch into the ORP roles it contains: objects (concepts,
/// claims, evidence) and processes.
pub fn detect_orp_pattern(nodes: &[Node]) -> OrpPattern {
    let mut objects = Vec::new();
    let mut processes = Vec::new();
    for node in nodes {
        match node.label.as_str() {
            "Concept" | "Claim" | "Evidence" => objects.push(node.id.clone()),
            "Process" => processes.push(node.id.clone()),
            _ => {}
        }
    }
    OrpPattern { objects, processes }
}

/// Object and process node IDs detected in a batch.
#[derive(Debug, Clone, Default)]
pub struct OrpPattern {
    pub objects: Vec<String>,
    pub processes: Vec<String>,
}

impl OrpPattern {
    pub fn to_value(&self) -> Value {
        json!({
            "objects": self.objects,
            "relations": [],
            "processes": self.processes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_inference_by_keyword() {
        assert_eq!(infer_scale("overall system architecture", 2), Scale::Macro);
        assert_eq!(infer_scale("logic gate cluster", 2), Scale::Meso);
        assert_eq!(infer_scale("photosynthesis", 2), Scale::Micro);
    }

    #[test]
    fn test_scale_inference_by_node_count() {
        assert_eq!(infer_scale("plain", 60), Scale::Macro);
        assert_eq!(infer_scale("plain", 15), Scale::Meso);
        assert_eq!(infer_scale("plain", 3), Scale::Micro);
    }

    #[test]
    fn test_create_hypernode_properties() {
        let hn = create_hypernode("Cluster_5_nodes", Scale::Meso, vec!["C:a".into()]);
        assert_eq!(hn.label, "Hypernode");
        assert_eq!(hn.prop_str("scale"), Some("meso"));
        assert_eq!(hn.prop_str("name"), Some("Cluster_5_nodes"));
        assert!(crate::schema::validate_id(&hn.id));
    }

    #[test]
    fn test_orp_pattern_split() {
        let nodes = vec![
            Node::new("C:a", "Concept"),
            Node::new("P:b", "Process"),
            Node::new("HN:c", "Hypernode"),
        ];
        let pattern = detect_orp_pattern(&nodes);
        assert_eq!(pattern.objects, vec!["C:a"]);
        assert_eq!(pattern.processes, vec!["P:b"]);
    }

    #[test]
    fn test_scale_parse() {
        assert_eq!(Scale::from_str_loose("MESO"), Some(Scale::Meso));
        assert_eq!(Scale::from_str_loose("giant"), None);
    }
}
