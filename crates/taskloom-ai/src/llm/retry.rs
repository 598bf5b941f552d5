//! Retry policy and error classification for LLM calls.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed per loop iteration.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = (self.initial_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Coarse failure category used to pick retry behavior and user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Timeout,
    RateLimit,
    Network,
    Unauthorized,
    Other,
}

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "429"];
const NETWORK_MARKERS: &[&str] = &[
    "network",
    "econnreset",
    "connection reset",
    "502",
    "503",
    "service unavailable",
];
const UNAUTHORIZED_MARKERS: &[&str] = &["401", "unauthorized", "invalid api key"];

impl ErrorCategory {
    /// Classify an error message by case-insensitive substring match.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if has(TIMEOUT_MARKERS) {
            ErrorCategory::Timeout
        } else if has(RATE_LIMIT_MARKERS) {
            ErrorCategory::RateLimit
        } else if has(NETWORK_MARKERS) {
            ErrorCategory::Network
        } else if has(UNAUTHORIZED_MARKERS) {
            ErrorCategory::Unauthorized
        } else {
            ErrorCategory::Other
        }
    }

    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout | ErrorCategory::RateLimit | ErrorCategory::Network
        )
    }

    /// Message shown to the user in place of a raw provider error.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCategory::Timeout => {
                "The request took too long to complete. Please try again in a moment."
            }
            ErrorCategory::RateLimit => {
                "I'm receiving too many requests right now. Please wait a moment and try again."
            }
            ErrorCategory::Network => {
                "I'm having trouble reaching the AI service. Please check your connection and try again."
            }
            ErrorCategory::Unauthorized => {
                "Authentication with the AI service failed. Please check your API key settings."
            }
            ErrorCategory::Other => {
                "Sorry, something went wrong while processing your request. Please try again."
            }
        }
    }
}

/// Whether an error message describes a transient failure.
pub fn is_transient(message: &str) -> bool {
    ErrorCategory::classify(message).is_transient()
}
