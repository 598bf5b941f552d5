//! Tool executor: dispatches LLM tool calls and converts every outcome into a
//! tool-result message.
//!
//! A failing, missing or panicking tool produces an error result for that
//! call only; the rest of the batch still runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::AiError;
use crate::llm::{Message, ToolCall};
use crate::tools::registry::ToolRegistry;
use crate::tools::traits::{ToolContext, ToolOutput};

/// Default cap on tool result text placed into the conversation.
pub const DEFAULT_MAX_TOOL_RESULT_LENGTH: usize = 4000;

/// Observer hooks around each tool call.
pub trait ToolObserver: Send + Sync {
    fn on_tool_start(&self, _call: &ToolCall) {}
    fn on_tool_complete(&self, _call: &ToolCall, _output: &ToolOutput, _elapsed: Duration) {}
    fn on_tool_error(&self, _call: &ToolCall, _error: &str) {}
}

/// Default observer that logs through `tracing`.
pub struct TracingToolObserver;

impl ToolObserver for TracingToolObserver {
    fn on_tool_start(&self, call: &ToolCall) {
        debug!(tool = %call.name, call_id = %call.id, "Tool call started");
    }

    fn on_tool_complete(&self, call: &ToolCall, output: &ToolOutput, elapsed: Duration) {
        debug!(
            tool = %call.name,
            call_id = %call.id,
            success = output.success,
            elapsed_ms = elapsed.as_millis() as u64,
            "Tool call finished"
        );
    }

    fn on_tool_error(&self, call: &ToolCall, error: &str) {
        warn!(tool = %call.name, call_id = %call.id, error = %error, "Tool call failed");
    }
}

/// Keep the first `max_chars` chars of `content`, noting the original length in chars.
fn truncate_tool_output(content: String, max_chars: usize) -> String {
    let Some((end, _)) = content.char_indices().nth(max_chars) else {
        return content;
    };
    format!(
        "{}...[truncated, {} chars total]",
        &content[..end],
        content.chars().count()
    )
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    observer: Arc<dyn ToolObserver>,
    worker_id: RwLock<Option<String>>,
    max_result_length: usize,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            observer: Arc::new(TracingToolObserver),
            worker_id: RwLock::new(None),
            max_result_length: DEFAULT_MAX_TOOL_RESULT_LENGTH,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_max_result_length(mut self, max: usize) -> Self {
        self.max_result_length = max;
        self
    }

    /// Set the worker that subsequent tool calls act for.
    pub fn set_worker_id(&self, worker_id: impl Into<String>) {
        *self.worker_id.write() = Some(worker_id.into());
    }

    pub fn worker_id(&self) -> Option<String> {
        self.worker_id.read().clone()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute each call in order and return one tool-result message per call.
    pub async fn execute_tools(&self, tool_calls: &[ToolCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            results.push(self.execute_one(call).await);
        }
        results
    }

    async fn execute_one(&self, call: &ToolCall) -> Message {
        self.observer.on_tool_start(call);
        let started = Instant::now();

        let ctx = ToolContext::for_call(call.id.clone(), self.worker_id());

        let outcome = match self.registry.get(&call.name) {
            None => Err(AiError::ToolNotFound(call.name.clone()).to_string()),
            Some(tool) => {
                let args = call.arguments.clone();
                // Run on its own task so a panicking tool only fails this call.
                let handle = tokio::spawn(async move { tool.execute(args, &ctx).await });
                match handle.await {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(error)) => Err(error.to_string()),
                    Err(join_error) => Err(format!("Tool task panicked: {}", join_error)),
                }
            }
        };

        let content = match outcome {
            Ok(output) => {
                self.observer
                    .on_tool_complete(call, &output, started.elapsed());
                output.into_content().unwrap_or_else(|error| {
                    self.observer.on_tool_error(call, &error);
                    format!("Error: {}", error)
                })
            }
            Err(error) => {
                self.observer.on_tool_error(call, &error);
                format!("Error: {}", error)
            }
        };

        Message::tool_result(
            call.id.clone(),
            call.name.clone(),
            truncate_tool_output(content, self.max_result_length),
        )
    }
}
