//! Resource limits, partial updates and admission errors.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const MAX_CONCURRENT_LLM_CALLS_ENV: &str = "TASKLOOM_MAX_CONCURRENT_LLM_CALLS";
pub const MAX_QUEUED_MESSAGES_ENV: &str = "TASKLOOM_MAX_QUEUED_MESSAGES";
pub const MAX_MESSAGES_PER_MINUTE_ENV: &str = "TASKLOOM_MAX_MESSAGES_PER_MINUTE";
pub const LLM_CALL_TIMEOUT_MS_ENV: &str = "TASKLOOM_LLM_CALL_TIMEOUT_MS";
pub const MAX_MEMORY_MB_ENV: &str = "TASKLOOM_MAX_MEMORY_MB";

/// Process-wide ceilings enforced by the resource monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_concurrent_llm_calls: usize,
    pub max_queued_messages: usize,
    pub max_messages_per_minute: usize,
    pub llm_call_timeout_ms: u64,
    pub max_memory_mb: u64,
    pub max_cpu_percent: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_llm_calls: 10,
            max_queued_messages: 1000,
            max_messages_per_minute: 600,
            llm_call_timeout_ms: 30_000,
            max_memory_mb: 512,
            max_cpu_percent: 80.0,
        }
    }
}

impl ResourceLimits {
    pub fn llm_call_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_call_timeout_ms)
    }

    /// Defaults overridden by `TASKLOOM_*` environment variables.
    pub fn from_env() -> Self {
        let mut limits = Self::default();
        limits.apply_env_overrides(|key| std::env::var(key).ok());
        limits
    }

    /// Apply overrides from `lookup`; unparsable values are logged and ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse::<T>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(env = key, value = %raw, "Ignoring invalid resource limit override");
                    None
                }
            }
        }

        if let Some(value) = parse::<usize>(&lookup, MAX_CONCURRENT_LLM_CALLS_ENV) {
            self.max_concurrent_llm_calls = value;
        }
        if let Some(value) = parse::<usize>(&lookup, MAX_QUEUED_MESSAGES_ENV) {
            self.max_queued_messages = value;
        }
        if let Some(value) = parse::<usize>(&lookup, MAX_MESSAGES_PER_MINUTE_ENV) {
            self.max_messages_per_minute = value;
        }
        if let Some(value) = parse::<u64>(&lookup, LLM_CALL_TIMEOUT_MS_ENV) {
            self.llm_call_timeout_ms = value;
        }
        if let Some(value) = parse::<u64>(&lookup, MAX_MEMORY_MB_ENV) {
            self.max_memory_mb = value;
        }
    }

    pub fn apply(&mut self, update: &ResourceLimitsUpdate) {
        if let Some(value) = update.max_concurrent_llm_calls {
            self.max_concurrent_llm_calls = value;
        }
        if let Some(value) = update.max_queued_messages {
            self.max_queued_messages = value;
        }
        if let Some(value) = update.max_messages_per_minute {
            self.max_messages_per_minute = value;
        }
        if let Some(value) = update.llm_call_timeout_ms {
            self.llm_call_timeout_ms = value;
        }
        if let Some(value) = update.max_memory_mb {
            self.max_memory_mb = value;
        }
        if let Some(value) = update.max_cpu_percent {
            self.max_cpu_percent = value;
        }
    }
}

/// Partial update for [`ResourceLimits`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimitsUpdate {
    pub max_concurrent_llm_calls: Option<usize>,
    pub max_queued_messages: Option<usize>,
    pub max_messages_per_minute: Option<usize>,
    pub llm_call_timeout_ms: Option<u64>,
    pub max_memory_mb: Option<u64>,
    pub max_cpu_percent: Option<f64>,
}

/// Typed error describing which admission limit refused the request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    ConcurrentCallsExceeded { limit: usize, active: usize },
    QueueFull { limit: usize, queued: usize },
    MessageRateExceeded { limit: usize, per_minute: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::ConcurrentCallsExceeded { limit, active } => {
                write!(
                    f,
                    "Too many concurrent LLM calls: {} active (limit: {})",
                    active, limit
                )
            }
            ResourceError::QueueFull { limit, queued } => {
                write!(
                    f,
                    "Message queue is full: {} queued (limit: {})",
                    queued, limit
                )
            }
            ResourceError::MessageRateExceeded { limit, per_minute } => {
                write!(
                    f,
                    "Message rate exceeded: {} per minute (limit: {})",
                    per_minute, limit
                )
            }
        }
    }
}

impl std::error::Error for ResourceError {}
