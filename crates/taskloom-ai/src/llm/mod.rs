//! LLM module - provider-agnostic client abstraction

mod client;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock_client;
pub mod retry;

pub use client::{
    CompletionRequest, CompletionResponse, LlmClient, Message, Role, TokenUsage, ToolCall,
};
#[cfg(any(test, feature = "test-utils"))]
pub use mock_client::{MockLlmClient, MockReply, MockStep};
pub use retry::{ErrorCategory, RetryPolicy};
