//! In-memory task-state registry per thread, feeding telemetry without
//! relying on chat memory.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Task lifecycle states visible to telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadTaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ThreadTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadTaskStatus::Pending => "pending",
            ThreadTaskStatus::InProgress => "in_progress",
            ThreadTaskStatus::Completed => "completed",
            ThreadTaskStatus::Failed => "failed",
        }
    }
}

/// Task state for one thread.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadTaskState {
    pub thread_id: String,
    pub status: ThreadTaskStatus,
    pub agent: Option<String>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Registry of task state per thread id.
#[derive(Clone, Default)]
pub struct TaskStateRegistry {
    by_thread: Arc<Mutex<HashMap<String, ThreadTaskState>>>,
}

impl TaskStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status for a thread, preserving agent/error unless given.
    pub fn set_status(
        &self,
        thread_id: &str,
        status: ThreadTaskStatus,
        agent: Option<&str>,
        error: Option<&str>,
    ) {
        let mut map = self.by_thread.lock();
        let entry = map
            .entry(thread_id.to_string())
            .or_insert_with(|| ThreadTaskState {
                thread_id: thread_id.to_string(),
                status: ThreadTaskStatus::Pending,
                agent: None,
                error: None,
                updated_at: Utc::now(),
            });
        entry.status = status;
        entry.updated_at = Utc::now();
        if let Some(agent) = agent {
            entry.agent = Some(agent.to_string());
        }
        if let Some(error) = error {
            entry.error = Some(error.to_string());
        }
        debug!(thread_id = %thread_id, status = status.as_str(), "Task state updated");
    }

    pub fn get(&self, thread_id: &str) -> Option<ThreadTaskState> {
        self.by_thread.lock().get(thread_id).cloned()
    }

    /// Most recently updated states first.
    pub fn list_recent(&self, limit: usize) -> Vec<ThreadTaskState> {
        let map = self.by_thread.lock();
        let mut states: Vec<ThreadTaskState> = map.values().cloned().collect();
        states.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        states.truncate(limit);
        states
    }

    pub fn clear(&self, thread_id: Option<&str>) {
        let mut map = self.by_thread.lock();
        match thread_id {
            Some(id) => {
                map.remove(id);
            }
            None => map.clear(),
        }
    }
}
