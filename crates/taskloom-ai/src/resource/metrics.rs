//! Metric snapshots, alerts and reports produced by the resource monitor.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::limits::ResourceLimits;

#[derive(Debug, Clone, Serialize)]
pub struct ResourceMetrics {
    pub timestamp: DateTime<Utc>,
    pub active_llm_calls: usize,
    pub queued_messages: usize,
    /// Resident set size, 0 where the platform does not expose it.
    pub memory_usage_mb: f64,
    /// Approximated from LLM call utilization.
    pub cpu_usage_percent: f64,
    pub messages_per_minute: usize,
    pub errors_per_minute: usize,
    pub average_response_time_ms: f64,
    pub cache_hit_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    pub metrics: ResourceMetrics,
    pub limits: ResourceLimits,
    pub under_stress: bool,
    pub recent_alerts: Vec<Alert>,
}
