//! Task execution lifecycle events committed to a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status marker carried by failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Failed,
}

/// Lifecycle event for one execution of a recurring task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskExecutionEvent {
    #[serde(rename = "task_execution.start")]
    Start {
        task_id: String,
        store_id: String,
        started_at: DateTime<Utc>,
    },
    #[serde(rename = "task_execution.complete")]
    Complete {
        task_id: String,
        store_id: String,
        completed_at: DateTime<Utc>,
    },
    #[serde(rename = "task_execution.fail")]
    Fail {
        task_id: String,
        store_id: String,
        status: ExecutionStatus,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl TaskExecutionEvent {
    pub fn start(task_id: &str, store_id: &str) -> Self {
        Self::Start {
            task_id: task_id.to_string(),
            store_id: store_id.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn complete(task_id: &str, store_id: &str) -> Self {
        Self::Complete {
            task_id: task_id.to_string(),
            store_id: store_id.to_string(),
            completed_at: Utc::now(),
        }
    }

    pub fn fail(task_id: &str, store_id: &str, error: impl Into<String>) -> Self {
        Self::Fail {
            task_id: task_id.to_string(),
            store_id: store_id.to_string(),
            status: ExecutionStatus::Failed,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }

    /// Event name as committed to the store.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "task_execution.start",
            Self::Complete { .. } => "task_execution.complete",
            Self::Fail { .. } => "task_execution.fail",
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Start { task_id, .. }
            | Self::Complete { task_id, .. }
            | Self::Fail { task_id, .. } => task_id,
        }
    }

    pub fn store_id(&self) -> &str {
        match self {
            Self::Start { store_id, .. }
            | Self::Complete { store_id, .. }
            | Self::Fail { store_id, .. } => store_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_event_serializes_with_status() {
        let event = TaskExecutionEvent::fail("task-1", "store-a", "boom");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "task_execution.fail");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
        assert_eq!(json["task_id"], "task-1");
        assert_eq!(json["store_id"], "store-a");
        assert!(json.get("failed_at").is_some());
    }

    #[test]
    fn test_name_matches_serialized_tag() {
        for event in [
            TaskExecutionEvent::start("t", "s"),
            TaskExecutionEvent::complete("t", "s"),
            TaskExecutionEvent::fail("t", "s", "e"),
        ] {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }

    #[test]
    fn test_start_event_roundtrip() {
        let event = TaskExecutionEvent::start("t", "s");
        let json = serde_json::to_string(&event).unwrap();
        let back: TaskExecutionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
