//! Resource monitor: LLM admission control, rate windows and alerts.

mod limits;
mod metrics;
mod monitor;

pub use limits::{
    LLM_CALL_TIMEOUT_MS_ENV, MAX_CONCURRENT_LLM_CALLS_ENV, MAX_MEMORY_MB_ENV,
    MAX_MESSAGES_PER_MINUTE_ENV, MAX_QUEUED_MESSAGES_ENV, ResourceError, ResourceLimits,
    ResourceLimitsUpdate,
};
pub use metrics::{Alert, AlertLevel, ResourceMetrics, ResourceReport};
pub use monitor::ResourceMonitor;
