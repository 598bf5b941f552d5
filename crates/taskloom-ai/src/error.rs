//! Error types for the AI module

use thiserror::Error;

use crate::llm::retry;
use crate::resource::ResourceError;

/// AI module error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Resource limit reached: {0}")]
    ResourceExhausted(#[from] ResourceError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    /// Whether a retry of the same request is likely to succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Llm(message) => retry::is_transient(message),
            _ => false,
        }
    }
}

/// Result type alias for AI operations
pub type Result<T> = std::result::Result<T, AiError>;
