//! Changelog entries: immutable records of applied diffs at specific
//! versions. Persistence lives in the service crate; this module only defines
//! the entry shape.

use crate::diff::{format_diff_summary, Diff};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One append-only changelog entry. Versions start at 1 and increase
/// strictly; entries are never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub version: i64,
    pub diff_id: String,
    pub timestamp: DateTime<Utc>,
    pub diff: Diff,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub summary: String,
}

impl ChangelogEntry {
    /// Build an entry for a diff about to be recorded at `version`.
    pub fn new(version: i64, diff_id: impl Into<String>, diff: Diff) -> Self {
        let summary = format_diff_summary(&diff);
        Self {
            version,
            diff_id: diff_id.into(),
            timestamp: Utc::now(),
            diff,
            source_agent: None,
            source_document: None,
            reason: None,
            result: None,
            summary,
        }
    }
}
