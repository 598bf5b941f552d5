//! Store abstractions consumed by the scheduler.
//!
//! Implementations live outside the orchestrator (event-sourced app stores,
//! the in-memory store in `taskloom-core`, test doubles).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::TaskExecutionEvent;
use crate::task::RecurringTaskDefinition;

/// Query descriptor understood by task stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreQuery {
    /// Enabled recurring tasks with `next_execution_at <= now`.
    DueRecurringTasks { now: DateTime<Utc> },
    /// Every recurring task in the store.
    AllRecurringTasks,
}

impl StoreQuery {
    /// Apply the query filter to a task row.
    pub fn matches(&self, task: &RecurringTaskDefinition) -> bool {
        match self {
            StoreQuery::DueRecurringTasks { now } => task.is_due(*now),
            StoreQuery::AllRecurringTasks => true,
        }
    }
}

/// A data store holding recurring tasks and accepting lifecycle events.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Run a query and return the matching task rows.
    async fn query(&self, query: StoreQuery) -> Result<Vec<RecurringTaskDefinition>>;

    /// Commit a lifecycle event.
    async fn commit(&self, event: TaskExecutionEvent) -> Result<()>;
}
