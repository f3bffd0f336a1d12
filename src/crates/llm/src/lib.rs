//! Model clients for the gleaner workspace.
//!
//! Defines the provider-agnostic [`ChatModel`] trait with request/response
//! types and token accounting, concrete clients for OpenAI, Anthropic, and
//! Moonshot (OpenAI-compatible), the model tiering configuration, and the
//! pricing table used for cost estimation.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod openai;
pub mod pricing;

pub use config::{model_for_tier, tier_for_task, ModelTier, Provider};
pub use error::{LlmError, Result};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Chat message roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Request with a single user message.
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: prompt.into(),
            }],
            temperature: Some(0.0),
            max_tokens: None,
        }
    }

    /// Request with a system instruction followed by a user message.
    pub fn with_system(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![
                ChatMessage {
                    role: ChatRole::System,
                    content: system.into(),
                },
                ChatMessage {
                    role: ChatRole::User,
                    content: prompt.into(),
                },
            ],
            temperature: Some(0.0),
            max_tokens: None,
        }
    }

    /// Total character length of all message contents.
    pub fn content_len(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A chat completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    /// Actual token usage when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub model: String,
}

/// A chat model client.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one chat completion.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// The model name used for pricing lookups.
    fn model_name(&self) -> &str;

    /// The provider behind this client.
    fn provider(&self) -> Provider;
}

/// Estimate token count from text length, roughly 4 characters per token.
pub fn estimate_tokens(text_len: usize) -> usize {
    (text_len / 4).max(1)
}
