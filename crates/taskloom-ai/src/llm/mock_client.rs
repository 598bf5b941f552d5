//! Scripted `LlmClient` for loop and scheduler tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

use crate::error::{AiError, Result};

use super::{CompletionRequest, CompletionResponse, LlmClient, Role, TokenUsage, ToolCall};

#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    /// Fails the call with `AiError::Llm`.
    Error(String),
}

/// One scripted reply, optionally delayed (tokio time, so paused clocks apply).
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay: Duration,
    pub reply: MockReply,
}

impl MockStep {
    fn now(reply: MockReply) -> Self {
        Self {
            delay: Duration::ZERO,
            reply,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::now(MockReply::Text(content.into()))
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::tool_calls(vec![ToolCall::new(id, name, arguments)])
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::now(MockReply::ToolCalls(calls))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::now(MockReply::Error(message.into()))
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = Duration::from_millis(delay_ms);
        self
    }
}

/// Replays [`MockStep`]s in order and records every request.
/// When the script is exhausted it answers `mock-echo: <last user message>`.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    model: String,
    script: Arc<Mutex<VecDeque<MockStep>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_steps(model, Vec::new())
    }

    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            model: model.into(),
            script: Arc::new(Mutex::new(steps.into())),
            requests: Arc::default(),
        }
    }

    pub async fn push_step(&self, step: MockStep) {
        self.script.lock().await.push_back(step);
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

fn echo(request: &CompletionRequest) -> CompletionResponse {
    let last_user = request
        .messages
        .iter()
        .rev()
        .find(|msg| msg.role == Role::User);
    match last_user {
        Some(msg) => CompletionResponse::text(format!("mock-echo: {}", msg.content)),
        None => CompletionResponse::text("mock-ok"),
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().await.push(request.clone());

        let step = self.script.lock().await.pop_front();
        let Some(step) = step else {
            return Ok(echo(&request));
        };

        if !step.delay.is_zero() {
            sleep(step.delay).await;
        }

        let mut response = match step.reply {
            MockReply::Text(content) => CompletionResponse::text(content),
            MockReply::ToolCalls(calls) => CompletionResponse::with_tool_calls(calls),
            MockReply::Error(message) => return Err(AiError::Llm(message)),
        };
        let completion_tokens = response.content.as_ref().map_or(0, |c| c.len() as u32);
        response.usage = Some(TokenUsage {
            prompt_tokens: request.messages.len() as u32,
            completion_tokens,
            total_tokens: request.messages.len() as u32 + completion_tokens,
        });
        Ok(response)
    }
}
