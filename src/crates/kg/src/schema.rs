//! Node and edge schema catalog plus the ID service.
//!
//! The prefix mapping is persisted in IDs and appears on the wire, so it must
//! never change: C→Concept, CL→Claim, E→Evidence, SRC→Source, M→Method,
//! S→Scope, PO→Position, HN→Hypernode, P→Process.

use crate::error::{KgError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The nine node kinds of the graph schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Concept,
    Claim,
    Evidence,
    Source,
    Method,
    Scope,
    Position,
    Hypernode,
    Process,
}

impl NodeKind {
    /// All node kinds, in catalog order.
    pub const ALL: [NodeKind; 9] = [
        NodeKind::Concept,
        NodeKind::Claim,
        NodeKind::Evidence,
        NodeKind::Source,
        NodeKind::Method,
        NodeKind::Scope,
        NodeKind::Position,
        NodeKind::Hypernode,
        NodeKind::Process,
    ];

    /// The persisted ID prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            NodeKind::Concept => "C",
            NodeKind::Claim => "CL",
            NodeKind::Evidence => "E",
            NodeKind::Source => "SRC",
            NodeKind::Method => "M",
            NodeKind::Scope => "S",
            NodeKind::Position => "PO",
            NodeKind::Hypernode => "HN",
            NodeKind::Process => "P",
        }
    }

    /// Label string as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Concept => "Concept",
            NodeKind::Claim => "Claim",
            NodeKind::Evidence => "Evidence",
            NodeKind::Source => "Source",
            NodeKind::Method => "Method",
            NodeKind::Scope => "Scope",
            NodeKind::Position => "Position",
            NodeKind::Hypernode => "Hypernode",
            NodeKind::Process => "Process",
        }
    }

    /// Resolve a kind from its ID prefix.
    pub fn from_prefix(prefix: &str) -> Option<NodeKind> {
        NodeKind::ALL.iter().copied().find(|k| k.prefix() == prefix)
    }

    /// Resolve a kind from its label string.
    pub fn from_label(label: &str) -> Option<NodeKind> {
        NodeKind::ALL.iter().copied().find(|k| k.as_str() == label)
    }

    /// Property keys that must be present on a node of this kind.
    pub fn required_properties(&self) -> &'static [&'static str] {
        match self {
            NodeKind::Concept => &["name", "domain"],
            NodeKind::Claim => &["text", "claimType"],
            NodeKind::Evidence => &["type", "content"],
            NodeKind::Source => &["title"],
            NodeKind::Method => &["name", "type"],
            NodeKind::Scope => &["domain"],
            NodeKind::Position => &["statement", "domain"],
            NodeKind::Hypernode => &["name", "scale"],
            NodeKind::Process => &["name", "processType"],
        }
    }

    /// Property keys that may be present on a node of this kind.
    pub fn optional_properties(&self) -> &'static [&'static str] {
        match self {
            NodeKind::Concept => &[
                "definitions",
                "operationalizations",
                "misconceptions",
                "relations",
                "metadata",
            ],
            NodeKind::Claim => &[
                "scope",
                "confidence",
                "supports",
                "refutations",
                "sourceId",
                "conceptId",
            ],
            NodeKind::Evidence => &[
                "sourceId",
                "methodId",
                "strength",
                "sampleSize",
                "effectSize",
                "pValue",
            ],
            NodeKind::Source => &[
                "authors",
                "year",
                "type",
                "doi",
                "url",
                "trustScore",
                "impactFactor",
            ],
            NodeKind::Method => &["description", "validity", "reliability", "limitations"],
            NodeKind::Scope => &[
                "context",
                "constraints",
                "temporalRange",
                "spatialRange",
                "population",
            ],
            NodeKind::Position => &["arguments", "supportScore", "diversityScore", "metadata"],
            NodeKind::Hypernode => &[
                "subgraph_nodes",
                "subgraph_edges",
                "compression_level",
                "fractal_depth",
                "orp_structure",
                "aggregated_properties",
            ],
            NodeKind::Process => &["inputs", "outputs", "transformation", "scale"],
        }
    }
}

/// The edge types of the graph schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    Defines,
    UnderScope,
    Supports,
    Refutes,
    Contradicts,
    Prereq,
    RelatedTo,
    PrerequisiteOf,
    PartOf,
    IsA,
    EquivalentTo,
    AlignsWith,
    ComplementaryTo,
    ApplicationOf,
    DerivedFrom,
    UsesMethod,
    Cites,
    Contains,
    NestedIn,
    Aggregates,
    Enables,
    InputsTo,
    OutputsFrom,
    ScalesTo,
    Mirrors,
}

impl EdgeType {
    /// All edge types, in catalog order.
    pub const ALL: [EdgeType; 25] = [
        EdgeType::Defines,
        EdgeType::UnderScope,
        EdgeType::Supports,
        EdgeType::Refutes,
        EdgeType::Contradicts,
        EdgeType::Prereq,
        EdgeType::RelatedTo,
        EdgeType::PrerequisiteOf,
        EdgeType::PartOf,
        EdgeType::IsA,
        EdgeType::EquivalentTo,
        EdgeType::AlignsWith,
        EdgeType::ComplementaryTo,
        EdgeType::ApplicationOf,
        EdgeType::DerivedFrom,
        EdgeType::UsesMethod,
        EdgeType::Cites,
        EdgeType::Contains,
        EdgeType::NestedIn,
        EdgeType::Aggregates,
        EdgeType::Enables,
        EdgeType::InputsTo,
        EdgeType::OutputsFrom,
        EdgeType::ScalesTo,
        EdgeType::Mirrors,
    ];

    /// Type string as it appears on the wire. Mixed casing is historical and
    /// persisted, so it is preserved exactly.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Defines => "DEFINES",
            EdgeType::UnderScope => "UNDER_SCOPE",
            EdgeType::Supports => "SUPPORTS",
            EdgeType::Refutes => "REFUTES",
            EdgeType::Contradicts => "CONTRADICTS",
            EdgeType::Prereq => "PREREQ",
            EdgeType::RelatedTo => "RELATED_TO",
            EdgeType::PrerequisiteOf => "PrerequisiteOf",
            EdgeType::PartOf => "PartOf",
            EdgeType::IsA => "IsA",
            EdgeType::EquivalentTo => "EquivalentTo",
            EdgeType::AlignsWith => "AlignsWith",
            EdgeType::ComplementaryTo => "ComplementaryTo",
            EdgeType::ApplicationOf => "ApplicationOf",
            EdgeType::DerivedFrom => "DERIVED_FROM",
            EdgeType::UsesMethod => "USES_METHOD",
            EdgeType::Cites => "CITES",
            EdgeType::Contains => "CONTAINS",
            EdgeType::NestedIn => "NESTED_IN",
            EdgeType::Aggregates => "AGGREGATES",
            EdgeType::Enables => "ENABLES",
            EdgeType::InputsTo => "INPUTS_TO",
            EdgeType::OutputsFrom => "OUTPUTS_FROM",
            EdgeType::ScalesTo => "SCALES_TO",
            EdgeType::Mirrors => "MIRRORS",
        }
    }

    /// Resolve an edge type from its wire string.
    pub fn from_str_exact(s: &str) -> Option<EdgeType> {
        EdgeType::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Whether the edge is directional.
    pub fn directional(&self) -> bool {
        !matches!(
            self,
            EdgeType::Contradicts
                | EdgeType::RelatedTo
                | EdgeType::EquivalentTo
                | EdgeType::AlignsWith
                | EdgeType::ComplementaryTo
                | EdgeType::Mirrors
        )
    }

    /// Node kinds legal on the `from` side.
    pub fn from_kinds(&self) -> &'static [NodeKind] {
        use NodeKind::*;
        match self {
            EdgeType::Defines => &[Claim],
            EdgeType::UnderScope => &[Claim, Concept, Evidence],
            EdgeType::Supports | EdgeType::Refutes => &[Evidence],
            EdgeType::Contradicts => &[Claim],
            EdgeType::Prereq
            | EdgeType::RelatedTo
            | EdgeType::PrerequisiteOf
            | EdgeType::PartOf
            | EdgeType::IsA
            | EdgeType::EquivalentTo
            | EdgeType::AlignsWith
            | EdgeType::ComplementaryTo
            | EdgeType::ApplicationOf
            | EdgeType::DerivedFrom => &[Concept],
            EdgeType::UsesMethod => &[Evidence],
            EdgeType::Cites => &[Claim, Evidence, Position],
            EdgeType::Contains | EdgeType::Aggregates => &[Hypernode],
            EdgeType::NestedIn => &[Concept, Claim, Evidence, Hypernode, Process],
            EdgeType::Enables | EdgeType::OutputsFrom => &[Process],
            EdgeType::InputsTo => &[Concept, Claim, Evidence, Process],
            EdgeType::ScalesTo | EdgeType::Mirrors => &[Concept, Claim, Hypernode, Process],
        }
    }

    /// Node kinds legal on the `to` side.
    pub fn to_kinds(&self) -> &'static [NodeKind] {
        use NodeKind::*;
        match self {
            EdgeType::Defines => &[Concept],
            EdgeType::UnderScope => &[Scope],
            EdgeType::Supports | EdgeType::Refutes => &[Claim],
            EdgeType::Contradicts => &[Claim],
            EdgeType::Prereq
            | EdgeType::RelatedTo
            | EdgeType::PrerequisiteOf
            | EdgeType::PartOf
            | EdgeType::IsA
            | EdgeType::EquivalentTo
            | EdgeType::AlignsWith
            | EdgeType::ComplementaryTo
            | EdgeType::ApplicationOf
            | EdgeType::DerivedFrom => &[Concept],
            EdgeType::UsesMethod => &[Method],
            EdgeType::Cites => &[Source],
            EdgeType::Contains => &[Concept, Claim, Evidence, Hypernode, Process],
            EdgeType::NestedIn => &[Hypernode],
            EdgeType::Aggregates => &[Concept, Claim, Evidence],
            EdgeType::Enables => &[Concept, Claim, Evidence, Process],
            EdgeType::InputsTo => &[Process],
            EdgeType::OutputsFrom => &[Concept, Claim, Evidence, Process],
            EdgeType::ScalesTo | EdgeType::Mirrors => &[Concept, Claim, Hypernode, Process],
        }
    }

    /// Property keys documented for this edge type.
    pub fn property_names(&self) -> &'static [&'static str] {
        match self {
            EdgeType::Defines => &["strength", "primary"],
            EdgeType::UnderScope => &["applicability"],
            EdgeType::Supports | EdgeType::Refutes => {
                &["strength", "methodology", "replicationStatus"]
            }
            EdgeType::Contradicts => &["contradictionType", "strength", "scopeOverlap"],
            EdgeType::Prereq | EdgeType::PrerequisiteOf => &["necessity", "pedagogical"],
            EdgeType::RelatedTo => &["relationshipType", "strength"],
            EdgeType::PartOf
            | EdgeType::IsA
            | EdgeType::EquivalentTo
            | EdgeType::AlignsWith
            | EdgeType::ComplementaryTo
            | EdgeType::ApplicationOf => &["weight"],
            EdgeType::DerivedFrom => &["derivationType", "transformations"],
            EdgeType::UsesMethod => &["adherence", "modifications"],
            EdgeType::Cites => &["citationType", "location"],
            EdgeType::Contains => &["containment_type", "compression_level"],
            EdgeType::NestedIn => &["nesting_depth", "scale"],
            EdgeType::Aggregates => &["aggregation_type", "weight"],
            EdgeType::Enables => &["transformation_type", "scale", "strength"],
            EdgeType::InputsTo => &["input_type", "scale", "weight"],
            EdgeType::OutputsFrom => &["output_type", "scale", "strength"],
            EdgeType::ScalesTo => &["from_scale", "to_scale", "self_similarity_score"],
            EdgeType::Mirrors => &["mirror_scale", "similarity_score", "pattern_type"],
        }
    }
}

/// Generate an ID in the `PREFIX:uuid` format for a node kind.
pub fn generate_id(kind: NodeKind) -> String {
    format!("{}:{}", kind.prefix(), Uuid::new_v4())
}

/// Validate that an ID matches `PREFIX:uuid` with a known prefix.
pub fn validate_id(id: &str) -> bool {
    let Some((prefix, rest)) = id.split_once(':') else {
        return false;
    };
    if NodeKind::from_prefix(prefix).is_none() {
        return false;
    }
    rest.len() == 36 && rest.chars().filter(|c| *c == '-').count() == 4
}

/// Resolve a node kind from an ID prefix, if the prefix is known.
pub fn kind_of(id: &str) -> Option<NodeKind> {
    let (prefix, _) = id.split_once(':')?;
    NodeKind::from_prefix(prefix)
}

/// Parse a node kind from an ID, failing on unknown prefixes.
pub fn kind_of_strict(id: &str) -> Result<NodeKind> {
    kind_of(id).ok_or_else(|| KgError::InvalidId(id.to_string()))
}
