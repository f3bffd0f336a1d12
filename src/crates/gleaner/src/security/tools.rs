//! Tool governance: agents may only invoke approved tools; high-risk tools
//! are blocked outright and blocking always wins over approval.

use crate::config::Config;
use crate::error::{GleanerError, Result};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Tools the ingestion pipeline is allowed to use by default.
const DEFAULT_APPROVED: &[&str] = &[
    "llm_invoke",
    "http_get",
    "kg_query",
    "kg_apply_diff",
    "file_read",
    "file_write",
    "git_add_commit",
];

/// Tools that are never allowed.
const DEFAULT_BLOCKED: &[&str] = &[
    "eval",
    "exec",
    "subprocess",
    "os.system",
    "shell",
    "run_command",
    "execute_code",
];

/// Approved/blocked tool policy.
#[derive(Clone)]
pub struct ToolPolicy {
    inner: Arc<RwLock<ToolSets>>,
}

struct ToolSets {
    approved: HashSet<String>,
    blocked: HashSet<String>,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolPolicy {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ToolSets {
                approved: DEFAULT_APPROVED.iter().map(|s| s.to_string()).collect(),
                blocked: DEFAULT_BLOCKED.iter().map(|s| s.to_string()).collect(),
            })),
        }
    }

    /// Policy extended with the configured approval/block lists.
    pub fn from_config(config: &Config) -> Self {
        let policy = Self::new();
        for tool in &config.approved_tools {
            policy.approve(tool);
        }
        for tool in &config.blocked_tools {
            policy.block(tool);
        }
        policy
    }

    pub fn approve(&self, tool: &str) {
        self.inner.write().approved.insert(tool.to_string());
        info!(tool = %tool, "Tool approved");
    }

    pub fn block(&self, tool: &str) {
        let mut sets = self.inner.write();
        sets.blocked.insert(tool.to_string());
        sets.approved.remove(tool);
        info!(tool = %tool, "Tool blocked");
    }

    pub fn is_allowed(&self, tool: &str) -> bool {
        let sets = self.inner.read();
        !sets.blocked.contains(tool) && sets.approved.contains(tool)
    }

    /// Fail with a security error when the tool is not approved.
    pub fn require(&self, tool: &str) -> Result<()> {
        if !self.is_allowed(tool) {
            return Err(GleanerError::Security(format!(
                "Tool '{}' is not approved",
                tool
            )));
        }
        Ok(())
    }

    pub fn list_approved(&self) -> Vec<String> {
        let mut tools: Vec<String> = self.inner.read().approved.iter().cloned().collect();
        tools.sort();
        tools
    }
}
