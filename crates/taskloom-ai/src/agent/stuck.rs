//! Stuck detection for the agentic loop.
//!
//! A run is stuck when it keeps issuing the same tool call (same name, same
//! arguments). Each signature keeps a consecutive-repeat count that grows
//! while the signature keeps showing up among the most recent calls and
//! restarts once it drops out of that lookback.

use std::collections::{HashMap, VecDeque};

/// Configuration for stuck detection.
#[derive(Debug, Clone)]
pub struct StuckDetectorConfig {
    /// Repeat count at which the run is declared stuck. Default: 3.
    pub repeat_threshold: usize,
    /// How many of the most recent calls count as "still repeating". Default: 3.
    pub lookback: usize,
    /// Maximum recent signatures to keep. Default: 10.
    pub window_size: usize,
}

impl Default for StuckDetectorConfig {
    fn default() -> Self {
        Self {
            repeat_threshold: 3,
            lookback: 3,
            window_size: 10,
        }
    }
}

/// Information about a detected stuck state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckInfo {
    pub repeated_tool: String,
    pub signature: String,
    pub repeat_count: usize,
    pub message: String,
}

/// Tracks recent tool-call signatures and per-signature repeat counts.
#[derive(Debug)]
pub struct StuckDetector {
    config: StuckDetectorConfig,
    recent: VecDeque<String>,
    repeat_counts: HashMap<String, usize>,
}

impl StuckDetector {
    pub fn new(config: StuckDetectorConfig) -> Self {
        Self {
            recent: VecDeque::with_capacity(config.window_size),
            repeat_counts: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &StuckDetectorConfig {
        &self.config
    }

    /// Record one tool call and report whether it tipped the run into a stuck state.
    pub fn record(&mut self, tool_name: &str, signature: &str) -> Option<StuckInfo> {
        let lookback_start = self.recent.len().saturating_sub(self.config.lookback);
        let seen_recently = self
            .recent
            .iter()
            .skip(lookback_start)
            .any(|s| s == signature);

        let count = self.repeat_counts.entry(signature.to_string()).or_insert(0);
        *count = if seen_recently { *count + 1 } else { 1 };
        let count = *count;

        if self.recent.len() >= self.config.window_size {
            self.recent.pop_front();
        }
        self.recent.push_back(signature.to_string());

        (count >= self.config.repeat_threshold).then(|| StuckInfo {
            repeated_tool: tool_name.to_string(),
            signature: signature.to_string(),
            repeat_count: count,
            message: format!(
                "Detected a stuck loop: '{}' was called {} times in a row with the same arguments",
                tool_name, count
            ),
        })
    }

    pub fn recent_signatures(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.repeat_counts.clear();
    }
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self::new(StuckDetectorConfig::default())
    }
}
