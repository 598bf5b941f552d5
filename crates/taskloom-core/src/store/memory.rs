//! In-memory task store for embedding, demos and tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use taskloom_traits::{RecurringTaskDefinition, StoreQuery, TaskExecutionEvent, TaskStore};

/// Holds task rows in memory and records every committed event in order.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<RecurringTaskDefinition>>,
    events: RwLock<Vec<TaskExecutionEvent>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<RecurringTaskDefinition>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
            events: RwLock::new(Vec::new()),
        }
    }

    /// Insert a task, replacing any row with the same id.
    pub fn upsert_task(&self, task: RecurringTaskDefinition) {
        let mut tasks = self.tasks.write();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }
    }

    /// Move a task's next due time, as the tool layer does after a run.
    pub fn set_next_execution_at(&self, task_id: &str, at: Option<DateTime<Utc>>) -> bool {
        let mut tasks = self.tasks.write();
        match tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                task.next_execution_at = at;
                true
            }
            None => false,
        }
    }

    pub fn tasks(&self) -> Vec<RecurringTaskDefinition> {
        self.tasks.read().clone()
    }

    pub fn events(&self) -> Vec<TaskExecutionEvent> {
        self.events.read().clone()
    }

    pub fn events_for(&self, task_id: &str) -> Vec<TaskExecutionEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.task_id() == task_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn query(&self, query: StoreQuery) -> Result<Vec<RecurringTaskDefinition>> {
        Ok(self
            .tasks
            .read()
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }

    async fn commit(&self, event: TaskExecutionEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }
}
