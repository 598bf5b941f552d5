//! Taskloom AI - agent runtime for task execution
//!
//! This crate provides:
//! - Bounded agentic loop with retry, stuck detection and cancellation
//! - Provider-agnostic LLM client trait (plus a scripted mock for tests)
//! - Tool trait, registry and executor
//! - Process-wide resource monitor gating LLM calls

pub mod agent;
pub mod error;
pub mod llm;
pub mod resource;
pub mod tools;

// Re-export commonly used types
pub use agent::{
    AgenticLoop, ChannelObserver, ConversationHistory, IterationOutcome, LoopConfig, LoopEvent,
    LoopObserver, NullObserver, RunContext, RunStatus, RunSummary, TracingObserver,
};
pub use error::{AiError, Result};
pub use llm::{
    CompletionRequest, CompletionResponse, ErrorCategory, LlmClient, Message, RetryPolicy, Role,
    ToolCall,
};
pub use resource::{
    ResourceError, ResourceLimits, ResourceLimitsUpdate, ResourceMonitor, ResourceReport,
};
pub use tools::{Tool, ToolContext, ToolExecutor, ToolObserver, ToolOutput, ToolRegistry, ToolSchema};
