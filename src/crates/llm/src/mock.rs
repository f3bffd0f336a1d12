//! Mock chat model for tests.

use crate::config::Provider;
use crate::error::{LlmError, Result};
use crate::{estimate_tokens, ChatModel, ChatRequest, ChatResponse, Usage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A scripted model: returns queued responses in order, repeating the last
/// one when the queue runs dry. Records the requests it receives.
pub struct MockModel {
    model: String,
    responses: Mutex<Vec<String>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
    fail_with: Mutex<Option<String>>,
    /// Usage reported per call; None simulates a provider without metadata.
    usage: Option<Usage>,
}

impl MockModel {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            usage: Some(Usage {
                input_tokens: 100,
                output_tokens: 50,
            }),
        }
    }

    /// A model that answers every request with the same text.
    pub fn always(response: &str) -> Self {
        Self::new(vec![response])
    }

    /// Report this usage on each response (None = no provider metadata).
    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    /// Make every subsequent call fail with a service-unavailable error.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().expect("mock lock") = Some(message.to_string());
    }

    /// Stop failing; resume scripted responses.
    pub fn recover(&self) {
        *self.fail_with.lock().expect("mock lock") = None;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("mock lock").clone()
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("mock lock").push(request);

        if let Some(message) = self.fail_with.lock().expect("mock lock").clone() {
            return Err(LlmError::ServiceUnavailable(message));
        }

        let responses = self.responses.lock().expect("mock lock");
        let content = responses
            .get(call)
            .or_else(|| responses.last())
            .cloned()
            .unwrap_or_default();

        let usage = self.usage.map(|u| Usage {
            input_tokens: u.input_tokens,
            output_tokens: estimate_tokens(content.len()).max(u.output_tokens),
        });

        Ok(ChatResponse {
            content,
            usage,
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> Provider {
        Provider::OpenAi
    }
}
