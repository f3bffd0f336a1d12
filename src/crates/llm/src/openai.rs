//! OpenAI chat-completions client.
//!
//! Moonshot exposes the same API shape, so [`OpenAiClient::moonshot`] reuses
//! this client with a different base URL.

use crate::config::Provider;
use crate::error::{LlmError, Result};
use crate::{ChatModel, ChatRequest, ChatResponse, Usage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const MOONSHOT_BASE_URL: &str = "https://api.moonshot.cn/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI-compatible API client.
#[derive(Clone)]
pub struct OpenAiClient {
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiClient {
    /// Client against the OpenAI API.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(Provider::OpenAi, OPENAI_BASE_URL, api_key, model)
    }

    /// Client against the Moonshot API (OpenAI-compatible).
    pub fn moonshot(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(Provider::Moonshot, MOONSHOT_BASE_URL, api_key, model)
    }

    fn with_base_url(
        provider: Provider,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            provider,
            base_url: base_url.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ApiRequest {
            model: self.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::Authentication(text),
                429 => LlmError::RateLimitExceeded(text),
                500..=599 => LlmError::ServiceUnavailable(format!("{}: {}", status, text)),
                _ => LlmError::Provider(format!("API error {}: {}", status, text)),
            });
        }

        let api_resp: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = api_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response had no choices".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: api_resp.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            model: api_resp.model,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> Provider {
        self.provider
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}
