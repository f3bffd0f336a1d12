//! Conversation checkpoint persistence.
//!
//! One row per thread; the latest successful state transition overwrites the
//! previous checkpoint, so a re-entered supervisor resumes exactly where the
//! conversation left off.

use crate::db::Database;
use crate::error::{GleanerError, Result};
use crate::graph::state::AgentState;
use chrono::Utc;
use tracing::debug;

/// Database-backed checkpoint store keyed by thread id.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    db: Database,
}

impl CheckpointStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist the state for a thread, replacing any previous checkpoint.
    pub async fn save(&self, thread_id: &str, state: &AgentState) -> Result<()> {
        let state_json = serde_json::to_string(state)?;
        sqlx::query(
            "INSERT INTO checkpoints (thread_id, state, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(thread_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
        )
        .bind(thread_id)
        .bind(&state_json)
        .bind(Utc::now().timestamp_millis())
        .execute(self.db.pool())
        .await
        .map_err(|e| GleanerError::Database(format!("Failed to save checkpoint: {}", e)))?;

        debug!(thread_id = %thread_id, "Checkpoint saved");
        Ok(())
    }

    /// Load the latest state for a thread.
    pub async fn load(&self, thread_id: &str) -> Result<Option<AgentState>> {
        let state_json: Option<String> =
            sqlx::query_scalar("SELECT state FROM checkpoints WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_optional(self.db.pool())
                .await
                .map_err(|e| GleanerError::Database(format!("Failed to load checkpoint: {}", e)))?;

        match state_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Remove a thread's checkpoint.
    pub async fn delete(&self, thread_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(self.db.pool())
            .await
            .map_err(|e| GleanerError::Database(format!("Failed to delete checkpoint: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::state::ApprovalDecision;

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let db = Database::in_memory().await.unwrap();
        let store = CheckpointStore::new(db);

        let mut state = AgentState::for_turn("42", "topic=photosynthesis");
        state.approval_required = true;
        state.diff_id = Some("d1".to_string());

        store.save("42", &state).await.unwrap();
        let loaded = store.load("42").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(store.load("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let db = Database::in_memory().await.unwrap();
        let store = CheckpointStore::new(db);

        let mut state = AgentState::for_turn("42", "first");
        store.save("42", &state).await.unwrap();

        state.approval_decision = Some(ApprovalDecision::Approve);
        state.user_input = Some("approve".to_string());
        store.save("42", &state).await.unwrap();

        let loaded = store.load("42").await.unwrap().unwrap();
        assert_eq!(loaded.user_input.as_deref(), Some("approve"));
        assert_eq!(loaded.approval_decision, Some(ApprovalDecision::Approve));
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::in_memory().await.unwrap();
        let store = CheckpointStore::new(db);
        store
            .save("42", &AgentState::for_turn("42", "x"))
            .await
            .unwrap();
        store.delete("42").await.unwrap();
        assert!(store.load("42").await.unwrap().is_none());
    }
}
