//! Supervisor state: the conversation checkpoint payload and the typed
//! updates nodes return.

use kg::Diff;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// User intents the supervisor routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Ingest,
    Query,
    GatherSources,
    FetchContent,
    ScoutDomains,
    ParallelTest,
    Improve,
    Help,
    Status,
    Cancel,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Ingest => "ingest",
            Intent::Query => "query",
            Intent::GatherSources => "gather_sources",
            Intent::FetchContent => "fetch_content",
            Intent::ScoutDomains => "scout_domains",
            Intent::ParallelTest => "parallel_test",
            Intent::Improve => "improve",
            Intent::Help => "help",
            Intent::Status => "status",
            Intent::Cancel => "cancel",
            Intent::Unknown => "unknown",
        }
    }

    /// Parse a model-produced intent label, constrained to the enum.
    pub fn from_label(label: &str) -> Option<Intent> {
        match label.trim().to_lowercase().as_str() {
            "ingest" => Some(Intent::Ingest),
            "query" => Some(Intent::Query),
            "gather_sources" | "source_gather" => Some(Intent::GatherSources),
            "fetch_content" | "content_fetch" => Some(Intent::FetchContent),
            "scout_domains" | "domain_scout" => Some(Intent::ScoutDomains),
            "parallel_test" => Some(Intent::ParallelTest),
            "improve" => Some(Intent::Improve),
            "help" => Some(Intent::Help),
            "status" => Some(Intent::Status),
            "cancel" => Some(Intent::Cancel),
            "unknown" => Some(Intent::Unknown),
            _ => None,
        }
    }
}

/// User decision on a surfaced key decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    pub fn from_label(label: &str) -> Option<ApprovalDecision> {
        match label.trim().to_lowercase().as_str() {
            "approve" => Some(ApprovalDecision::Approve),
            "reject" => Some(ApprovalDecision::Reject),
            _ => None,
        }
    }
}

/// The conversation state persisted per thread. Checkpoints are overwritten
/// by the latest successful state transition of their thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub task_queue: Vec<Value>,
    #[serde(default)]
    pub working_notes: Map<String, Value>,
    #[serde(default)]
    pub proposed_diff: Option<Diff>,
    /// Proposed source edits (path -> new content) pending a code_change
    /// decision.
    #[serde(default)]
    pub proposed_changes: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub improvement_plan: Option<Value>,
    #[serde(default)]
    pub diff_id: Option<String>,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub approval_decision: Option<ApprovalDecision>,
    #[serde(default)]
    pub final_response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub crucial_decision_type: Option<String>,
    #[serde(default)]
    pub crucial_decision_context: Option<Value>,
}

impl AgentState {
    /// Fresh state for one user turn.
    pub fn for_turn(chat_id: &str, user_input: &str) -> Self {
        Self {
            user_input: Some(user_input.to_string()),
            chat_id: chat_id.to_string(),
            ..Self::default()
        }
    }
}

/// A state update produced by one supervisor node. Fields left at their
/// defaults are not merged; explicit clears use the `clear_*` flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_notes: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_diff: Option<Diff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_changes: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_plan: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_decision: Option<ApprovalDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crucial_decision_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crucial_decision_context: Option<Value>,
    /// Clear the pending diff, pending code changes, and approval flags
    /// (cancel/reject/commit).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear_proposed_diff: bool,
}

impl StateUpdate {
    /// An update that only sets the final response.
    pub fn respond(text: impl Into<String>) -> Self {
        Self {
            final_response: Some(text.into()),
            ..Self::default()
        }
    }

    /// An update that records an error and a user-facing message.
    pub fn fail(error: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            final_response: Some(response.into()),
            ..Self::default()
        }
    }

    /// Merge this update into a state. Working notes merge key-wise; other
    /// set fields overwrite.
    pub fn merge_into(self, state: &mut AgentState) {
        if let Some(intent) = self.intent {
            state.intent = Some(intent);
        }
        if let Some(notes) = self.working_notes {
            for (key, value) in notes {
                state.working_notes.insert(key, value);
            }
        }
        if let Some(diff) = self.proposed_diff {
            state.proposed_diff = Some(diff);
        }
        if let Some(changes) = self.proposed_changes {
            state.proposed_changes = Some(changes);
        }
        if let Some(plan) = self.improvement_plan {
            state.improvement_plan = Some(plan);
        }
        if let Some(diff_id) = self.diff_id {
            state.diff_id = Some(diff_id);
        }
        if let Some(required) = self.approval_required {
            state.approval_required = required;
        }
        if let Some(decision) = self.approval_decision {
            state.approval_decision = Some(decision);
        }
        if let Some(response) = self.final_response {
            state.final_response = Some(response);
        }
        if let Some(error) = self.error {
            state.error = Some(error);
        }
        if let Some(kind) = self.crucial_decision_type {
            state.crucial_decision_type = Some(kind);
        }
        if let Some(context) = self.crucial_decision_context {
            state.crucial_decision_context = Some(context);
        }
        if self.clear_proposed_diff {
            state.proposed_diff = None;
            state.proposed_changes = None;
            state.improvement_plan = None;
            state.diff_id = None;
            state.approval_required = false;
            state.approval_decision = None;
            state.crucial_decision_type = None;
            state.crucial_decision_context = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_labels() {
        assert_eq!(Intent::from_label("ingest"), Some(Intent::Ingest));
        assert_eq!(Intent::from_label("GATHER_SOURCES"), Some(Intent::GatherSources));
        assert_eq!(Intent::from_label("domain_scout"), Some(Intent::ScoutDomains));
        assert_eq!(Intent::from_label("improve"), Some(Intent::Improve));
        assert_eq!(Intent::from_label("made_up"), None);
    }

    #[test]
    fn test_approval_decision_labels() {
        assert_eq!(
            ApprovalDecision::from_label("Approve"),
            Some(ApprovalDecision::Approve)
        );
        assert_eq!(ApprovalDecision::from_label("maybe"), None);
    }

    #[test]
    fn test_merge_overwrites_set_fields_only() {
        let mut state = AgentState::for_turn("42", "topic=photosynthesis");
        state.working_notes.insert("existing".into(), json!(1));

        let mut notes = Map::new();
        notes.insert("extracted".into(), json!({"entities": []}));
        StateUpdate {
            intent: Some(Intent::Ingest),
            working_notes: Some(notes),
            ..StateUpdate::default()
        }
        .merge_into(&mut state);

        assert_eq!(state.intent, Some(Intent::Ingest));
        assert_eq!(state.user_input.as_deref(), Some("topic=photosynthesis"));
        assert!(state.working_notes.contains_key("existing"));
        assert!(state.working_notes.contains_key("extracted"));
    }

    #[test]
    fn test_clear_proposed_diff() {
        let mut state = AgentState::default();
        state.proposed_diff = Some(Diff::empty());
        state.proposed_changes = Some(BTreeMap::from([("src/a.rs".to_string(), "fn a() {}".to_string())]));
        state.improvement_plan = Some(json!({"understanding": "x"}));
        state.diff_id = Some("d1".into());
        state.approval_required = true;
        state.crucial_decision_type = Some("kg_write".into());

        StateUpdate {
            clear_proposed_diff: true,
            final_response: Some("cancelled".into()),
            ..StateUpdate::default()
        }
        .merge_into(&mut state);

        assert!(state.proposed_diff.is_none());
        assert!(state.proposed_changes.is_none());
        assert!(state.improvement_plan.is_none());
        assert!(state.diff_id.is_none());
        assert!(!state.approval_required);
        assert!(state.crucial_decision_type.is_none());
        assert_eq!(state.final_response.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut state = AgentState::for_turn("7", "hello");
        state.approval_required = true;
        state.approval_decision = Some(ApprovalDecision::Approve);
        let json = serde_json::to_string(&state).unwrap();
        let parsed: AgentState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
