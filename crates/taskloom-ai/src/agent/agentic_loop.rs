//! Bounded, retrying, loop-detecting agent run.
//!
//! Each iteration calls the LLM once (plus any in-place retries), then either
//! executes the requested tools and continues, or ends the run. Every
//! iteration yields an [`IterationOutcome`]; [`AgenticLoop::finish`]
//! translates the terminal outcome into observer callbacks.
//!
//! Failure handling:
//! - transient provider errors are retried within the same iteration with
//!   exponential backoff, each iteration getting a fresh retry budget
//! - other provider errors end the run with a user-facing message
//! - a stuck loop or an exhausted iteration budget ends the run through
//!   `on_error` + `on_complete`
//! - only resource exhaustion is returned as `Err`

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::history::ConversationHistory;
use crate::agent::observer::{LoopErrorKind, LoopObserver, NullObserver};
use crate::agent::stuck::{StuckDetector, StuckDetectorConfig, StuckInfo};
use crate::error::{AiError, Result};
use crate::llm::{
    CompletionRequest, CompletionResponse, ErrorCategory, LlmClient, Message, RetryPolicy,
};
use crate::resource::ResourceMonitor;
use crate::tools::ToolExecutor;

pub const MAX_ITERATIONS_ENV: &str = "TASKLOOM_MAX_ITERATIONS";
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// Share of the iteration budget at which a one-time warning is logged.
const APPROACHING_LIMIT_RATIO: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: usize,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub retry: RetryPolicy,
    pub stuck: StuckDetectorConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: None,
            model: None,
            retry: RetryPolicy::default(),
            stuck: StuckDetectorConfig::default(),
        }
    }
}

impl LoopConfig {
    /// Defaults with `TASKLOOM_MAX_ITERATIONS` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(MAX_ITERATIONS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(value) => self.max_iterations = value.max(1),
                Err(_) => warn!(env = MAX_ITERATIONS_ENV, value = %raw, "Ignoring invalid override"),
            }
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Per-run inputs. Context values are handed to the provider untouched.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub task_id: Option<String>,
    pub store_id: Option<String>,
    /// Takes precedence over [`LoopConfig::max_iterations`].
    pub max_iterations: Option<usize>,
    pub worker_id: Option<String>,
    pub board_context: Option<Value>,
    pub worker_context: Option<Value>,
    pub navigation_context: Option<Value>,
    pub model: Option<String>,
    pub cancel: CancellationToken,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            task_id: None,
            store_id: None,
            max_iterations: None,
            worker_id: None,
            board_context: None,
            worker_context: None,
            navigation_context: None,
            model: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_task(task_id: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            store_id: Some(store_id.into()),
            ..Self::default()
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_board_context(mut self, context: Value) -> Self {
        self.board_context = Some(context);
        self
    }

    pub fn with_worker_context(mut self, context: Value) -> Self {
        self.worker_context = Some(context);
        self
    }

    pub fn with_navigation_context(mut self, context: Value) -> Self {
        self.navigation_context = Some(context);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What one iteration decided.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    Continuing,
    FinalMessage(Option<String>),
    StuckLoop(StuckInfo),
    MaxIterationsReached { max_iterations: usize },
    FatalError {
        category: ErrorCategory,
        user_message: String,
        error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    StuckLoop,
    MaxIterationsReached,
    FatalError,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub iterations: usize,
    pub retries: u32,
    pub final_message: Option<String>,
    pub error: Option<String>,
}

pub struct AgenticLoop {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    monitor: Arc<ResourceMonitor>,
    observer: Arc<dyn LoopObserver>,
    config: LoopConfig,
    history: ConversationHistory,
}

impl AgenticLoop {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        monitor: Arc<ResourceMonitor>,
        config: LoopConfig,
    ) -> Self {
        Self {
            llm,
            executor,
            monitor,
            observer: Arc::new(NullObserver),
            config,
            history: ConversationHistory::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoopObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn history(&self) -> &[Message] {
        self.history.messages()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn set_history(&mut self, messages: Vec<Message>) {
        self.history.replace(messages);
    }

    /// Drive one run to a terminal state.
    pub async fn run(
        &mut self,
        user_message: impl Into<String>,
        ctx: RunContext,
    ) -> Result<RunSummary> {
        let max_iterations = ctx
            .max_iterations
            .unwrap_or(self.config.max_iterations)
            .max(1);
        let warn_at = ((max_iterations as f64) * APPROACHING_LIMIT_RATIO).ceil() as usize;

        if let Some(worker_id) = &ctx.worker_id {
            self.executor.set_worker_id(worker_id.clone());
        }
        if self.history.is_empty() {
            self.history.push(Message::system(self.build_system_prompt()));
        }

        let mut user_message = Some(user_message.into());
        let mut stuck = StuckDetector::new(self.config.stuck.clone());
        let mut retries = 0u32;
        let mut warned = false;

        debug!(
            run_id = %ctx.run_id,
            task_id = ?ctx.task_id,
            store_id = ?ctx.store_id,
            max_iterations,
            "Agent run started"
        );

        for iteration in 1..=max_iterations {
            self.observer.on_iteration_start(iteration, max_iterations);
            if let Some(message) = user_message.take() {
                self.history.push(Message::user(message));
            }
            if iteration >= warn_at && !warned {
                warned = true;
                warn!(
                    run_id = %ctx.run_id,
                    iteration,
                    max_iterations,
                    "Run is approaching its iteration limit"
                );
            }

            let outcome = match self
                .run_iteration(iteration, max_iterations, &ctx, &mut stuck, &mut retries)
                .await
            {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(run_id = %ctx.run_id, iteration, error = %error, "Agent run refused");
                    self.observer
                        .on_error(LoopErrorKind::ResourceExhausted, &error.to_string());
                    return Err(error);
                }
            };
            self.observer.on_iteration_complete(iteration);

            if outcome != IterationOutcome::Continuing {
                return Ok(self.finish(outcome, iteration, retries, &ctx));
            }
        }

        Ok(self.finish(
            IterationOutcome::MaxIterationsReached { max_iterations },
            max_iterations,
            retries,
            &ctx,
        ))
    }

    /// One iteration, including in-place retries of transient provider errors.
    async fn run_iteration(
        &mut self,
        iteration: usize,
        max_iterations: usize,
        ctx: &RunContext,
        stuck: &mut StuckDetector,
        retries: &mut u32,
    ) -> Result<IterationOutcome> {
        let policy = self.config.retry.clone();
        let mut attempt = 0u32;

        loop {
            if ctx.cancel.is_cancelled() {
                return Ok(IterationOutcome::Cancelled);
            }

            let error = match self.call_llm(ctx).await {
                Ok(response) => return Ok(self.handle_response(response, ctx, stuck).await),
                Err(AiError::ResourceExhausted(e)) => return Err(AiError::ResourceExhausted(e)),
                Err(AiError::Cancelled) => return Ok(IterationOutcome::Cancelled),
                Err(error) => error,
            };

            let message = error.to_string();
            if error.is_transient() && iteration < max_iterations && attempt < policy.max_retries {
                attempt += 1;
                *retries += 1;
                let delay = policy.delay_for(attempt);
                self.observer.on_retry(iteration, attempt, delay, &message);

                if !self.backoff(delay, &ctx.cancel).await {
                    return Ok(IterationOutcome::Cancelled);
                }
                continue;
            }

            let category = ErrorCategory::classify(&message);
            return Ok(IterationOutcome::FatalError {
                category,
                user_message: category.user_message().to_string(),
                error: message,
            });
        }
    }

    /// Sleep before a retry. Returns false when cancelled first.
    async fn backoff(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn call_llm(&self, ctx: &RunContext) -> Result<CompletionResponse> {
        let call_id = self.monitor.track_llm_call_start()?;

        let request = CompletionRequest::new(self.history.to_vec())
            .with_tools(self.executor.registry().schemas())
            .with_model(ctx.model.clone().or_else(|| self.config.model.clone()))
            .with_board_context(ctx.board_context.clone())
            .with_worker_context(ctx.worker_context.clone())
            .with_navigation_context(ctx.navigation_context.clone());

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(AiError::Cancelled),
            response = self.llm.complete(request) => response,
        };
        // False when the call timeout already released the slot and counted the error.
        let released = self.monitor.track_llm_call_complete(
            &call_id,
            false,
            Some(started.elapsed().as_millis() as u64),
        );

        match &result {
            Ok(CompletionResponse {
                usage: Some(usage), ..
            }) => debug!(
                run_id = %ctx.run_id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "LLM call finished"
            ),
            Err(error) if released && !matches!(error, AiError::Cancelled) => {
                self.monitor.track_error("llm_call");
            }
            _ => {}
        }
        result
    }

    async fn handle_response(
        &mut self,
        response: CompletionResponse,
        ctx: &RunContext,
        stuck: &mut StuckDetector,
    ) -> IterationOutcome {
        if response.tool_calls.is_empty() {
            let text = response.content.unwrap_or_default();
            if text.trim().is_empty() {
                return IterationOutcome::FinalMessage(None);
            }
            self.history.push(Message::assistant(text.clone()));
            return IterationOutcome::FinalMessage(Some(text));
        }

        for call in &response.tool_calls {
            if let Some(info) = stuck.record(&call.name, &call.signature()) {
                return IterationOutcome::StuckLoop(info);
            }
        }

        if ctx.cancel.is_cancelled() {
            return IterationOutcome::Cancelled;
        }

        self.observer.on_tools_executing(&response.tool_calls);
        let results = self.executor.execute_tools(&response.tool_calls).await;

        self.history.push(Message::assistant_with_tool_calls(
            response.content,
            response.tool_calls,
        ));
        self.history.extend(results.iter().cloned());
        self.observer.on_tools_complete(&results);

        IterationOutcome::Continuing
    }

    /// Report a terminal outcome through the observer and summarize the run.
    fn finish(
        &self,
        outcome: IterationOutcome,
        iterations: usize,
        retries: u32,
        ctx: &RunContext,
    ) -> RunSummary {
        let mut summary = RunSummary {
            run_id: ctx.run_id.clone(),
            status: RunStatus::Completed,
            iterations,
            retries,
            final_message: None,
            error: None,
        };

        match outcome {
            IterationOutcome::Continuing => {}
            IterationOutcome::FinalMessage(text) => {
                if let Some(text) = &text {
                    self.observer.on_final_message(text);
                }
                summary.final_message = text;
            }
            IterationOutcome::StuckLoop(info) => {
                self.observer.on_error(LoopErrorKind::StuckLoop, &info.message);
                summary.status = RunStatus::StuckLoop;
                summary.error = Some(info.message);
            }
            IterationOutcome::MaxIterationsReached { max_iterations } => {
                let message = format!(
                    "Reached the maximum of {} iterations without a final answer. \
                     Break the request into smaller steps or raise {}.",
                    max_iterations, MAX_ITERATIONS_ENV
                );
                self.observer.on_error(LoopErrorKind::MaxIterations, &message);
                summary.status = RunStatus::MaxIterationsReached;
                summary.error = Some(message);
            }
            IterationOutcome::FatalError {
                category,
                user_message,
                error,
            } => {
                warn!(run_id = %ctx.run_id, category = ?category, error = %error, "Agent run failed");
                self.observer.on_final_message(&user_message);
                summary.status = RunStatus::FatalError;
                summary.final_message = Some(user_message);
                summary.error = Some(error);
            }
            IterationOutcome::Cancelled => {
                let message = "Run cancelled".to_string();
                self.observer.on_error(LoopErrorKind::Cancelled, &message);
                summary.status = RunStatus::Cancelled;
                summary.error = Some(message);
            }
        }

        self.observer.on_complete(&summary);
        summary
    }

    fn build_system_prompt(&self) -> String {
        let registry = self.executor.registry();
        let tools_desc: Vec<String> = registry
            .list()
            .iter()
            .filter_map(|name| registry.get(name))
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect();

        let base = self.config.system_prompt.as_deref().unwrap_or(
            "You are a helpful assistant that manages the user's projects and tasks using tools.",
        );

        if tools_desc.is_empty() {
            base.to_string()
        } else {
            format!("{}\n\nAvailable tools:\n{}", base, tools_desc.join("\n"))
        }
    }
}
