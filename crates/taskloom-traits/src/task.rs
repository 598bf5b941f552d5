//! Recurring task definitions as stored by the external data store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recurring task row owned by a data store.
///
/// The scheduler only reads these. Advancing `next_execution_at` after a run
/// is done by the store's own tool layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTaskDefinition {
    pub id: String,
    pub name: String,
    /// Prompt handed to the agent when the task runs.
    pub prompt: String,
    pub interval_hours: u32,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    /// `None` means "not yet scheduled"; such tasks are never due.
    #[serde(default)]
    pub next_execution_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl RecurringTaskDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        prompt: impl Into<String>,
        interval_hours: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt: prompt.into(),
            interval_hours,
            last_executed_at: None,
            next_execution_at: None,
            enabled: true,
            project_id: None,
        }
    }

    pub fn with_next_execution_at(mut self, at: DateTime<Utc>) -> Self {
        self.next_execution_at = Some(at);
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// True when the task is enabled and its next execution is at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_execution_at.is_some_and(|at| at <= now)
    }
}
