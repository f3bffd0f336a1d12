//! Chat transport: a thin Telegram Bot API sender with an inline
//! approve/reject keyboard. The transport is an external collaborator; the
//! trait keeps workers and tests independent of it.

use crate::error::{GleanerError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// Telegram message size limit, minus headroom.
const MAX_MESSAGE_LEN: usize = 4000;

/// Outbound chat transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a plain message to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Send an approval prompt with approve/reject buttons bound to a diff.
    async fn send_approval_prompt(&self, chat_id: i64, text: &str, diff_id: &str) -> Result<()>;
}

/// Telegram Bot API transport.
pub struct TelegramTransport {
    token: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            token: token.into(),
            client,
        }
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/{}", self.token, method);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GleanerError::Transport(format!("Telegram request failed: {}", e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GleanerError::Transport(format!(
                "Telegram API error {}: {}",
                status,
                tooling::logging::truncate_for_log(&text)
            )));
        }
        Ok(())
    }
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_LEN {
        text.to_string()
    } else {
        text.chars().take(MAX_MESSAGE_LEN).collect()
    }
}

/// The inline keyboard attached to approval prompts.
pub fn approval_keyboard(diff_id: &str) -> serde_json::Value {
    json!({
        "inline_keyboard": [[
            {"text": "✅ Approve", "callback_data": format!("approve:{}", diff_id)},
            {"text": "❌ Reject", "callback_data": format!("reject:{}", diff_id)}
        ]]
    })
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.post(
            "sendMessage",
            json!({"chat_id": chat_id, "text": clip(text)}),
        )
        .await
    }

    async fn send_approval_prompt(&self, chat_id: i64, text: &str, diff_id: &str) -> Result<()> {
        self.post(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": clip(text),
                "reply_markup": approval_keyboard(diff_id)
            }),
        )
        .await
    }
}

/// Transport that only logs; used when no bot token is configured.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        info!(chat_id, text = %tooling::logging::truncate_for_transport(text, 200), "Transport (noop): message");
        Ok(())
    }

    async fn send_approval_prompt(&self, chat_id: i64, text: &str, diff_id: &str) -> Result<()> {
        warn!(chat_id, diff_id = %diff_id, "Transport (noop): approval prompt dropped");
        let _ = text;
        Ok(())
    }
}

/// A sent message captured by the recording transport.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    /// Set when the message carried an approval keyboard.
    pub approval_diff_id: Option<String>,
}

/// In-memory transport for tests: records every message it sends.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn last(&self) -> Option<SentMessage> {
        self.sent.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().push(SentMessage {
            chat_id,
            text: text.to_string(),
            approval_diff_id: None,
        });
        Ok(())
    }

    async fn send_approval_prompt(&self, chat_id: i64, text: &str, diff_id: &str) -> Result<()> {
        self.sent.lock().push(SentMessage {
            chat_id,
            text: text.to_string(),
            approval_diff_id: Some(diff_id.to_string()),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_keyboard_encodes_diff_id() {
        let keyboard = approval_keyboard("d-123");
        let row = &keyboard["inline_keyboard"][0];
        assert_eq!(row[0]["callback_data"], "approve:d-123");
        assert_eq!(row[1]["callback_data"], "reject:d-123");
    }

    #[tokio::test]
    async fn test_recording_transport_captures() {
        let transport = RecordingTransport::new();
        transport.send_message(42, "hello").await.unwrap();
        transport
            .send_approval_prompt(42, "approve?", "d1")
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text, "hello");
        assert_eq!(sent[1].approval_diff_id.as_deref(), Some("d1"));
    }

    #[test]
    fn test_clip_bounds_length_and_keeps_formatting() {
        let long = "line\n".repeat(2000);
        let clipped = clip(&long);
        assert_eq!(clipped.chars().count(), 4000);
        assert!(clipped.contains('\n'));
        assert_eq!(clip("short\ntext"), "short\ntext");
    }
}
