//! Observer hooks for agentic loop runs.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::llm::{Message, ToolCall};

use super::agentic_loop::{RunStatus, RunSummary};

/// Why a run reported an error through [`LoopObserver::on_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopErrorKind {
    StuckLoop,
    MaxIterations,
    ResourceExhausted,
    Cancelled,
}

/// Callback set invoked as a run progresses. All methods default to no-ops.
pub trait LoopObserver: Send + Sync {
    fn on_iteration_start(&self, _iteration: usize, _max_iterations: usize) {}
    fn on_iteration_complete(&self, _iteration: usize) {}
    fn on_tools_executing(&self, _calls: &[ToolCall]) {}
    fn on_tools_complete(&self, _results: &[Message]) {}
    fn on_final_message(&self, _content: &str) {}
    fn on_error(&self, _kind: LoopErrorKind, _message: &str) {}
    fn on_complete(&self, _summary: &RunSummary) {}
    fn on_retry(&self, _iteration: usize, _attempt: u32, _delay: Duration, _error: &str) {}
}

pub struct NullObserver;

impl LoopObserver for NullObserver {}

/// Observer events in channel form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    IterationStart {
        iteration: usize,
        max_iterations: usize,
    },
    IterationComplete {
        iteration: usize,
    },
    ToolsExecuting {
        tool_names: Vec<String>,
    },
    ToolsComplete {
        count: usize,
    },
    FinalMessage {
        content: String,
    },
    Error {
        kind: LoopErrorKind,
        message: String,
    },
    Retry {
        iteration: usize,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    Complete {
        status: RunStatus,
        iterations: usize,
    },
}

/// Forwards every callback as a [`LoopEvent`]; a dropped receiver is ignored.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LoopEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LoopEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: LoopEvent) {
        let _ = self.tx.send(event);
    }
}

impl LoopObserver for ChannelObserver {
    fn on_iteration_start(&self, iteration: usize, max_iterations: usize) {
        self.send(LoopEvent::IterationStart {
            iteration,
            max_iterations,
        });
    }

    fn on_iteration_complete(&self, iteration: usize) {
        self.send(LoopEvent::IterationComplete { iteration });
    }

    fn on_tools_executing(&self, calls: &[ToolCall]) {
        self.send(LoopEvent::ToolsExecuting {
            tool_names: calls.iter().map(|c| c.name.clone()).collect(),
        });
    }

    fn on_tools_complete(&self, results: &[Message]) {
        self.send(LoopEvent::ToolsComplete {
            count: results.len(),
        });
    }

    fn on_final_message(&self, content: &str) {
        self.send(LoopEvent::FinalMessage {
            content: content.to_string(),
        });
    }

    fn on_error(&self, kind: LoopErrorKind, message: &str) {
        self.send(LoopEvent::Error {
            kind,
            message: message.to_string(),
        });
    }

    fn on_complete(&self, summary: &RunSummary) {
        self.send(LoopEvent::Complete {
            status: summary.status,
            iterations: summary.iterations,
        });
    }

    fn on_retry(&self, iteration: usize, attempt: u32, delay: Duration, error: &str) {
        self.send(LoopEvent::Retry {
            iteration,
            attempt,
            delay_ms: delay.as_millis() as u64,
            error: error.to_string(),
        });
    }
}

/// Logs run progress through `tracing`.
pub struct TracingObserver;

impl LoopObserver for TracingObserver {
    fn on_iteration_start(&self, iteration: usize, max_iterations: usize) {
        debug!(iteration, max_iterations, "Iteration started");
    }

    fn on_tools_executing(&self, calls: &[ToolCall]) {
        debug!(count = calls.len(), "Executing tool calls");
    }

    fn on_error(&self, kind: LoopErrorKind, message: &str) {
        warn!(kind = ?kind, "{}", message);
    }

    fn on_complete(&self, summary: &RunSummary) {
        info!(
            run_id = %summary.run_id,
            status = ?summary.status,
            iterations = summary.iterations,
            retries = summary.retries,
            "Agent run finished"
        );
    }

    fn on_retry(&self, iteration: usize, attempt: u32, delay: Duration, error: &str) {
        warn!(
            iteration,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient LLM error, retrying"
        );
    }
}
