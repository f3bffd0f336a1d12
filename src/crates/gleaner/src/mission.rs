//! The standing mission and the key decisions surfaced to the user.

/// The overarching mission driving autonomous behavior.
pub const OVERARCHING_MISSION: &str = "\
Build and maintain a decision-grade knowledge graph that:
1. Uses free secondary sources (APIs, indexes) to identify primary sources (DOI, arXiv, etc.) and secure claims.
2. Expands the graph autonomously across domains (discovery -> primary IDs -> optional fetch/ingest).
3. Monitors agents, queue, cost, and KG health; improves agents when gaps or failures are detected.
4. Surfaces crucial decisions to the human: approve/reject KG writes, resolve contradictions, prioritize domains, handle budget caps.";

/// Decision points where the supervisor must stop and get human input.
pub const CRUCIAL_DECISION_TYPES: &[(&str, &str)] = &[
    ("kg_write", "Commit or reject proposed KG changes (nodes/edges)."),
    ("code_change", "Apply or reject proposed code/agent improvements."),
    (
        "contradiction_resolution",
        "How to resolve conflicting claims (flag, prefer new, prefer existing).",
    ),
    (
        "domain_priority",
        "Which domains to expand next when multiple candidates exist.",
    ),
    (
        "budget_cap",
        "Budget limit approached; pause expansion or continue with reduced scope.",
    ),
    ("stuck_tasks", "Tasks stuck in queue; retry, skip, or triage."),
];

/// Human-readable label for a key-decision type.
pub fn crucial_decision_label(decision_type: &str) -> &'static str {
    CRUCIAL_DECISION_TYPES
        .iter()
        .find(|(key, _)| *key == decision_type)
        .map(|(_, label)| *label)
        .unwrap_or("Key decision")
}

/// Short mission summary for prompts and help text.
pub fn mission_summary() -> &'static str {
    "Mission: Build a decision-grade KG using secondary->primary methodology; \
     expand autonomously; monitor and improve agents; come to the user for key decisions \
     (KG commit, code change, contradiction, priority, budget, stuck tasks)."
}
