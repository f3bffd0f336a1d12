//! Validators for agent outputs.
//!
//! Every agent output passes a validator before it enters shared state.
//! Validation is transformative: validators return sanitized copies and
//! never mutate their input. Partial outputs are dropped, never
//! half-applied.

use crate::error::{GleanerError, Result};
use crate::graph::state::{ApprovalDecision, StateUpdate};
use kg::schema::{EdgeType, NodeKind};
use kg::{Diff, Edge, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Max counts and lengths preventing runaway outputs.
pub mod thresholds {
    // Extractor
    pub const MAX_ENTITIES_PER_EXTRACTION: usize = 200;
    pub const MAX_RELATIONS_PER_EXTRACTION: usize = 500;
    pub const MAX_CLAIMS_PER_EXTRACTION: usize = 100;
    pub const MAX_PROPERTY_VALUE_LENGTH: usize = 50_000;
    pub const MAX_ENTITY_PROPERTIES: usize = 50;
    pub const MAX_ENTITY_ID_LENGTH: usize = 200;

    // Content fetcher
    pub const MAX_DOMAINS_PER_REQUEST: usize = 10;
    pub const MAX_SOURCES_PER_DOMAIN: usize = 50;

    // Linker
    pub const MAX_LINKED_ENTITIES: usize = 500;
    pub const MAX_LINKED_RELATIONS: usize = 1000;

    // Writer / diff
    pub const MAX_NODES_ADD: usize = 300;
    pub const MAX_NODES_UPDATE: usize = 200;
    pub const MAX_NODES_DELETE: usize = 100;
    pub const MAX_EDGES_ADD: usize = 600;
    pub const MAX_EDGES_UPDATE: usize = 400;
    pub const MAX_EDGES_DELETE: usize = 200;

    // State updates
    pub const MAX_FINAL_RESPONSE_LENGTH: usize = 50_000;
    pub const MAX_ERROR_LENGTH: usize = 2_000;
    pub const MAX_USER_INPUT_LENGTH: usize = 10_000;

    // Query
    pub const MAX_QUERY_RESPONSE_LENGTH: usize = 30_000;

    // Improvement agent
    pub const MAX_PROPOSED_FILES: usize = 20;
    pub const MAX_FILE_CONTENT_LENGTH: usize = 500_000;
}

fn validation_error(message: impl Into<String>) -> GleanerError {
    GleanerError::Validation(message.into())
}

/// Extractor output: entities, relations, and claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractorOutput {
    #[serde(default)]
    pub entities: Vec<Node>,
    #[serde(default)]
    pub relations: Vec<Edge>,
    #[serde(default)]
    pub claims: Vec<Value>,
}

/// Linker output: entities and relations rewritten to canonical IDs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkerOutput {
    #[serde(default)]
    pub entities: Vec<Node>,
    #[serde(default)]
    pub relations: Vec<Edge>,
    #[serde(default)]
    pub canonical_ids: std::collections::HashMap<String, String>,
}

/// Parsed content-fetcher intent, clamped to safe bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchIntent {
    pub domains: Vec<String>,
    pub max_sources: usize,
    pub min_priority: f64,
}

fn validate_entity(entity: &Node, index: usize) -> Result<()> {
    if NodeKind::from_label(&entity.label).is_none() {
        return Err(validation_error(format!(
            "entities[{}].label '{}' not in allowlist",
            index, entity.label
        )));
    }
    if entity.id.len() > thresholds::MAX_ENTITY_ID_LENGTH {
        return Err(validation_error(format!(
            "entities[{}].id exceeds max length",
            index
        )));
    }
    if entity.properties.len() > thresholds::MAX_ENTITY_PROPERTIES {
        return Err(validation_error(format!(
            "entities[{}].properties has too many keys",
            index
        )));
    }
    for (key, value) in &entity.properties {
        if let Some(s) = value.as_str() {
            if s.len() > thresholds::MAX_PROPERTY_VALUE_LENGTH {
                return Err(validation_error(format!(
                    "entities[{}].properties.{} exceeds max length",
                    index, key
                )));
            }
        }
    }
    Ok(())
}

fn validate_relation(relation: &Edge, index: usize) -> Result<()> {
    if relation.from.is_empty() || relation.to.is_empty() || relation.edge_type.is_empty() {
        return Err(validation_error(format!(
            "relations[{}] must have from, to, type",
            index
        )));
    }
    if EdgeType::from_str_exact(&relation.edge_type).is_none() {
        return Err(validation_error(format!(
            "relations[{}].type '{}' not in allowlist",
            index, relation.edge_type
        )));
    }
    Ok(())
}

/// Validate extractor output: structure, allowlists, thresholds, and the
/// claim-provenance rule.
///
/// When `require_claim_provenance` is set, any Claim lacking `sourceId`,
/// `evidenceIds`, or an inbound SUPPORTS relation is quarantined: removed
/// from the output along with every relation referencing it.
pub fn validate_extractor_output(
    output: &ExtractorOutput,
    require_claim_provenance: bool,
) -> Result<ExtractorOutput> {
    if output.entities.len() > thresholds::MAX_ENTITIES_PER_EXTRACTION {
        return Err(validation_error(format!(
            "entities count exceeds max ({})",
            thresholds::MAX_ENTITIES_PER_EXTRACTION
        )));
    }
    if output.relations.len() > thresholds::MAX_RELATIONS_PER_EXTRACTION {
        return Err(validation_error(format!(
            "relations count exceeds max ({})",
            thresholds::MAX_RELATIONS_PER_EXTRACTION
        )));
    }
    if output.claims.len() > thresholds::MAX_CLAIMS_PER_EXTRACTION {
        return Err(validation_error(format!(
            "claims count exceeds max ({})",
            thresholds::MAX_CLAIMS_PER_EXTRACTION
        )));
    }

    for (i, entity) in output.entities.iter().enumerate() {
        validate_entity(entity, i)?;
    }
    for (i, relation) in output.relations.iter().enumerate() {
        validate_relation(relation, i)?;
    }

    let mut entities = output.entities.clone();
    let mut relations = output.relations.clone();

    // Provenance rule: a Claim must carry sourceId/evidenceIds or be the
    // target of a SUPPORTS relation.
    let mut unbacked: HashSet<String> = HashSet::new();
    for (i, entity) in entities.iter().enumerate() {
        if entity.label != "Claim" {
            continue;
        }
        let has_provenance = entity.prop_str("sourceId").is_some()
            || entity.properties.get("evidenceIds").is_some()
            || relations
                .iter()
                .any(|r| r.edge_type == "SUPPORTS" && r.to == entity.id);
        if !has_provenance {
            if require_claim_provenance {
                unbacked.insert(entity.id.clone());
                warn!(
                    index = i,
                    id = %entity.id,
                    "Claim has no sourceId/evidenceIds; will be filtered out"
                );
            } else {
                debug!(index = i, id = %entity.id, "Claim has no provenance hint");
            }
        }
    }

    if require_claim_provenance && !unbacked.is_empty() {
        entities.retain(|e| !unbacked.contains(&e.id));
        relations.retain(|r| !unbacked.contains(&r.from) && !unbacked.contains(&r.to));
        info!(
            quarantined = unbacked.len(),
            "Filtered Claims without provenance"
        );
    }

    Ok(ExtractorOutput {
        entities,
        relations,
        claims: output.claims.clone(),
    })
}

/// Validate linker output structure and bounds.
pub fn validate_linker_output(output: &LinkerOutput) -> Result<LinkerOutput> {
    if output.entities.len() > thresholds::MAX_LINKED_ENTITIES {
        return Err(validation_error(format!(
            "linked entities count exceeds max ({})",
            thresholds::MAX_LINKED_ENTITIES
        )));
    }
    if output.relations.len() > thresholds::MAX_LINKED_RELATIONS {
        return Err(validation_error(format!(
            "linked relations count exceeds max ({})",
            thresholds::MAX_LINKED_RELATIONS
        )));
    }
    Ok(output.clone())
}

/// Validate a proposed diff's per-bucket bounds and reference closure:
/// ids referenced by added edges either appear in the diff's node adds or
/// must pre-exist in the store (not checkable here, so only well-formedness
/// of the id is required).
pub fn validate_proposed_diff(diff: &Diff) -> Result<()> {
    let buckets = [
        ("nodes.add", diff.nodes.add.len(), thresholds::MAX_NODES_ADD),
        (
            "nodes.update",
            diff.nodes.update.len(),
            thresholds::MAX_NODES_UPDATE,
        ),
        (
            "nodes.delete",
            diff.nodes.delete.len(),
            thresholds::MAX_NODES_DELETE,
        ),
        ("edges.add", diff.edges.add.len(), thresholds::MAX_EDGES_ADD),
        (
            "edges.update",
            diff.edges.update.len(),
            thresholds::MAX_EDGES_UPDATE,
        ),
        (
            "edges.delete",
            diff.edges.delete.len(),
            thresholds::MAX_EDGES_DELETE,
        ),
    ];
    for (bucket, count, max) in buckets {
        if count > max {
            return Err(validation_error(format!(
                "proposed_diff.{} exceeds max ({})",
                bucket, max
            )));
        }
    }
    for (i, edge) in diff.edges.add.iter().enumerate() {
        if edge.from.is_empty() || edge.to.is_empty() {
            return Err(validation_error(format!(
                "proposed_diff.edges.add[{}] missing endpoint",
                i
            )));
        }
    }
    Ok(())
}

/// Validate and clamp a parsed content-fetcher intent from raw JSON.
pub fn validate_fetch_intent(parsed: &Value) -> Result<FetchIntent> {
    let obj = parsed
        .as_object()
        .ok_or_else(|| validation_error("Content fetcher parsed output must be an object"))?;

    let mut domains: Vec<String> = obj
        .get("domains")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|d| d.as_str())
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect()
        })
        .unwrap_or_default();
    // Dedupe, preserving first occurrence.
    let mut seen = HashSet::new();
    domains.retain(|d| seen.insert(d.to_lowercase()));
    domains.truncate(thresholds::MAX_DOMAINS_PER_REQUEST);

    let max_sources = obj
        .get("max_sources")
        .and_then(|v| v.as_f64())
        .map(|v| (v as i64).clamp(1, thresholds::MAX_SOURCES_PER_DOMAIN as i64) as usize)
        .unwrap_or(10);

    let min_priority = obj
        .get("min_priority")
        .and_then(|v| v.as_f64())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    Ok(FetchIntent {
        domains,
        max_sources,
        min_priority,
    })
}

/// Validate and sanitize a state update before it is merged. Returns a
/// clamped copy.
pub fn validate_state_update(update: &StateUpdate) -> Result<StateUpdate> {
    let mut validated = update.clone();

    if let Some(response) = &validated.final_response {
        if response.chars().count() > thresholds::MAX_FINAL_RESPONSE_LENGTH {
            validated.final_response = Some(
                response
                    .chars()
                    .take(thresholds::MAX_FINAL_RESPONSE_LENGTH)
                    .collect(),
            );
        }
    }
    if let Some(error) = &validated.error {
        if error.chars().count() > thresholds::MAX_ERROR_LENGTH {
            validated.error = Some(error.chars().take(thresholds::MAX_ERROR_LENGTH).collect());
        }
    }
    if let Some(diff) = &validated.proposed_diff {
        validate_proposed_diff(diff)?;
    }
    Ok(validated)
}

/// Validate a model-produced state update in raw JSON form: unknown keys are
/// rejected, the approval decision is constrained to the allowlist.
pub fn validate_state_update_json(value: &Value) -> Result<StateUpdate> {
    const ALLOWED_KEYS: &[&str] = &[
        "intent",
        "working_notes",
        "proposed_diff",
        "diff_id",
        "approval_required",
        "approval_decision",
        "final_response",
        "error",
        "crucial_decision_type",
        "crucial_decision_context",
    ];

    let obj = value
        .as_object()
        .ok_or_else(|| validation_error("State update must be an object"))?;
    for key in obj.keys() {
        if !ALLOWED_KEYS.contains(&key.as_str()) {
            return Err(validation_error(format!(
                "State update key '{}' not in allowlist",
                key
            )));
        }
    }

    if let Some(decision) = obj.get("approval_decision").and_then(|v| v.as_str()) {
        if ApprovalDecision::from_label(decision).is_none() {
            return Err(validation_error(format!(
                "approval_decision '{}' must be approve or reject",
                decision
            )));
        }
    }

    let update: StateUpdate = serde_json::from_value(value.clone())
        .map_err(|e| validation_error(format!("State update shape invalid: {}", e)))?;
    validate_state_update(&update)
}

/// File extensions a code-change proposal may touch.
const IMPROVEMENT_EXTENSIONS: &[&str] = &[".rs", ".toml", ".md", ".sql"];

/// Validate a proposed code-change set: bounded file count and sizes,
/// relative paths with no traversal, extensions restricted to source and
/// config files. The improvement plan, when present, must carry a list
/// under `files_to_modify`.
pub fn validate_improvement_output(
    changes: &std::collections::BTreeMap<String, String>,
    plan: Option<&Value>,
) -> Result<()> {
    if changes.len() > thresholds::MAX_PROPOSED_FILES {
        return Err(validation_error(format!(
            "proposed_changes has too many files (max {})",
            thresholds::MAX_PROPOSED_FILES
        )));
    }
    for (path, content) in changes {
        if !is_safe_relative_path(path) {
            return Err(validation_error(format!(
                "proposed_changes path '{}' must be relative with no traversal",
                path
            )));
        }
        if !IMPROVEMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            return Err(validation_error(format!(
                "proposed_changes path '{}' has a disallowed extension",
                path
            )));
        }
        if content.len() > thresholds::MAX_FILE_CONTENT_LENGTH {
            return Err(validation_error(format!(
                "proposed_changes['{}'] exceeds max size",
                path
            )));
        }
    }
    if let Some(plan) = plan {
        if let Some(files) = plan.get("files_to_modify") {
            if !files.is_array() {
                return Err(validation_error(
                    "improvement_plan.files_to_modify must be a list",
                ));
            }
        }
    }
    Ok(())
}

fn is_safe_relative_path(path: &str) -> bool {
    let p = std::path::Path::new(path);
    !path.is_empty()
        && !p.is_absolute()
        && p.components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

/// Validate a query node response length.
pub fn validate_query_response(response: &str) -> Result<String> {
    if response.chars().count() > thresholds::MAX_QUERY_RESPONSE_LENGTH {
        return Ok(response
            .chars()
            .take(thresholds::MAX_QUERY_RESPONSE_LENGTH)
            .collect());
    }
    Ok(response.to_string())
}
