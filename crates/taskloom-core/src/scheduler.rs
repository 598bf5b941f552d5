//! Recurring task scheduler.
//!
//! Each tick queries one store for due tasks, claims every due occurrence in
//! the processed-execution tracker and runs the agent once per successful
//! claim. The claim is keyed by the task's due instant, so re-observing the
//! same occurrence on later ticks (or from other processes sharing the
//! tracker) never runs it twice.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taskloom_ai::agent::{
    AgenticLoop, LoopConfig, LoopObserver, RunContext, RunStatus, RunSummary, TracingObserver,
};
use taskloom_ai::llm::LlmClient;
use taskloom_ai::resource::ResourceMonitor;
use taskloom_ai::tools::ToolExecutor;
use taskloom_storage::ProcessedExecutionTracker;
use taskloom_traits::{RecurringTaskDefinition, StoreQuery, TaskExecutionEvent, TaskStore};

/// Runs one recurring task to completion.
#[async_trait]
pub trait TaskAgent: Send + Sync {
    /// Errors mark the execution as failed.
    async fn run_task(
        &self,
        store_id: &str,
        task: &RecurringTaskDefinition,
    ) -> Result<RunSummary>;
}

/// Default agent: a fresh [`AgenticLoop`] per task, seeded with the task prompt.
pub struct LoopTaskAgent {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    monitor: Arc<ResourceMonitor>,
    config: LoopConfig,
    observer: Arc<dyn LoopObserver>,
    cancel: CancellationToken,
}

impl LoopTaskAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        monitor: Arc<ResourceMonitor>,
        config: LoopConfig,
    ) -> Self {
        Self {
            llm,
            executor,
            monitor,
            config,
            observer: Arc::new(TracingObserver),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn LoopObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Runs started by this agent are cancelled together with `cancel`.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl TaskAgent for LoopTaskAgent {
    async fn run_task(
        &self,
        store_id: &str,
        task: &RecurringTaskDefinition,
    ) -> Result<RunSummary> {
        let mut agent = AgenticLoop::new(
            self.llm.clone(),
            self.executor.clone(),
            self.monitor.clone(),
            self.config.clone(),
        )
        .with_observer(self.observer.clone());

        let mut ctx =
            RunContext::for_task(task.id.clone(), store_id).with_cancel(self.cancel.child_token());
        if let Some(project_id) = &task.project_id {
            ctx = ctx.with_board_context(json!({ "project_id": project_id }));
        }

        let summary = agent.run(task.prompt.clone(), ctx).await?;
        // A cancelled occurrence never ran, so it must not be recorded as complete.
        if summary.status == RunStatus::Cancelled {
            bail!(
                "Run {} cancelled after {} iteration(s)",
                summary.run_id,
                summary.iterations
            );
        }
        Ok(summary)
    }
}

/// Counters for one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub due: usize,
    pub claimed: usize,
    /// Due occurrences already claimed earlier.
    pub skipped: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub processed_executions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

pub struct TaskScheduler {
    tracker: Arc<ProcessedExecutionTracker>,
    agent: Arc<dyn TaskAgent>,
}

impl TaskScheduler {
    pub fn new(tracker: Arc<ProcessedExecutionTracker>, agent: Arc<dyn TaskAgent>) -> Self {
        Self { tracker, agent }
    }

    pub fn tracker(&self) -> &Arc<ProcessedExecutionTracker> {
        &self.tracker
    }

    /// Run every due, unclaimed task in `store` once.
    ///
    /// Only a failing store query is returned as an error; per-task failures
    /// are committed as `task_execution.fail` events and counted.
    pub async fn check_and_execute_tasks(
        &self,
        store_id: &str,
        store: &dyn TaskStore,
    ) -> Result<TickReport> {
        let now = Utc::now();
        let tasks = store.query(StoreQuery::DueRecurringTasks { now }).await?;
        let mut report = TickReport::default();

        for task in tasks {
            // Stores may return extra rows; tasks without a due time are never run.
            let Some(due) = task.next_execution_at.filter(|_| task.is_due(now)) else {
                continue;
            };
            report.due += 1;

            match self.tracker.try_claim(store_id, &task.id, due) {
                Ok(true) => report.claimed += 1,
                Ok(false) => {
                    debug!(store_id, task_id = %task.id, due = %due, "Already processed, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(store_id, task_id = %task.id, error = %e, "Failed to claim task execution");
                    report.failed += 1;
                    continue;
                }
            }

            if self.execute_task(store_id, store, &task).await {
                report.completed += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.due > 0 {
            info!(
                store_id,
                due = report.due,
                claimed = report.claimed,
                skipped = report.skipped,
                completed = report.completed,
                failed = report.failed,
                "Scheduler tick finished"
            );
        }
        Ok(report)
    }

    /// Run one claimed task and commit its lifecycle events. Returns true on success.
    async fn execute_task(
        &self,
        store_id: &str,
        store: &dyn TaskStore,
        task: &RecurringTaskDefinition,
    ) -> bool {
        info!(store_id, task_id = %task.id, task_name = %task.name, "Executing recurring task");
        commit_event(store, TaskExecutionEvent::start(&task.id, store_id)).await;

        match self.agent.run_task(store_id, task).await {
            Ok(summary) => {
                debug!(
                    store_id,
                    task_id = %task.id,
                    status = ?summary.status,
                    iterations = summary.iterations,
                    "Recurring task run finished"
                );
                commit_event(store, TaskExecutionEvent::complete(&task.id, store_id)).await;
                true
            }
            Err(e) => {
                warn!(store_id, task_id = %task.id, error = %e, "Recurring task failed");
                commit_event(
                    store,
                    TaskExecutionEvent::fail(&task.id, store_id, e.to_string()),
                )
                .await;
                false
            }
        }
    }

    pub fn stats(&self, store_id: Option<&str>) -> Result<SchedulerStats> {
        Ok(SchedulerStats {
            processed_executions: self.tracker.count_for(store_id)?,
            store_id: store_id.map(str::to_string),
        })
    }

    /// Remove claims older than `max_age_days` (0 removes all).
    pub fn cleanup(&self, max_age_days: u32) -> Result<usize> {
        let removed = self.tracker.cleanup(max_age_days)?;
        info!(max_age_days, removed, "Processed execution cleanup finished");
        Ok(removed)
    }

    pub fn close(&self) {
        self.tracker.close();
    }
}

async fn commit_event(store: &dyn TaskStore, event: TaskExecutionEvent) {
    let name = event.name();
    if let Err(e) = store.commit(event).await {
        warn!(event = name, error = %e, "Failed to commit task execution event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTaskStore;
    use chrono::Duration;
    use parking_lot::Mutex;
    use taskloom_ai::agent::RunStatus;
    use taskloom_ai::llm::{MockLlmClient, MockStep};
    use taskloom_ai::resource::ResourceError;
    use taskloom_ai::tools::ToolRegistry;
    use taskloom_ai::AiError;
    use tempfile::TempDir;

    fn summary() -> RunSummary {
        RunSummary {
            run_id: "run".to_string(),
            status: RunStatus::Completed,
            iterations: 1,
            retries: 0,
            final_message: Some("done".to_string()),
            error: None,
        }
    }

    #[derive(Default)]
    struct RecordingAgent {
        runs: Mutex<Vec<(String, String)>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl TaskAgent for RecordingAgent {
        async fn run_task(
            &self,
            store_id: &str,
            task: &RecurringTaskDefinition,
        ) -> Result<RunSummary> {
            self.runs
                .lock()
                .push((store_id.to_string(), task.id.clone()));
            match &self.fail_with {
                Some(message) => Err(anyhow::anyhow!(message.clone())),
                None => Ok(summary()),
            }
        }
    }

    fn tracker() -> (Arc<ProcessedExecutionTracker>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ProcessedExecutionTracker::open(dir.path().join("claims.redb")).unwrap();
        (Arc::new(tracker), dir)
    }

    fn due_task(id: &str) -> RecurringTaskDefinition {
        RecurringTaskDefinition::new(id, id, format!("run {}", id), 24)
            .with_next_execution_at(Utc::now() - Duration::minutes(1))
    }

    #[tokio::test]
    async fn test_second_tick_skips_claimed_task() {
        let (tracker, _dir) = tracker();
        let agent = Arc::new(RecordingAgent::default());
        let scheduler = TaskScheduler::new(tracker, agent.clone());
        let store = InMemoryTaskStore::with_tasks(vec![due_task("t1")]);

        let first = scheduler.check_and_execute_tasks("s1", &store).await.unwrap();
        let second = scheduler.check_and_execute_tasks("s1", &store).await.unwrap();

        assert_eq!(first.completed, 1);
        assert_eq!(second.skipped, 1);
        assert_eq!(second.claimed, 0);
        assert_eq!(agent.runs.lock().len(), 1);

        let names: Vec<&str> = store.events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["task_execution.start", "task_execution.complete"]);
    }

    #[tokio::test]
    async fn test_unscheduled_and_disabled_tasks_are_skipped() {
        let (tracker, _dir) = tracker();
        let agent = Arc::new(RecordingAgent::default());
        let scheduler = TaskScheduler::new(tracker, agent.clone());
        let store = InMemoryTaskStore::with_tasks(vec![
            RecurringTaskDefinition::new("unscheduled", "u", "p", 1),
            due_task("off").disabled(),
            RecurringTaskDefinition::new("future", "f", "p", 1)
                .with_next_execution_at(Utc::now() + Duration::hours(1)),
        ]);

        let report = scheduler.check_and_execute_tasks("s1", &store).await.unwrap();

        assert_eq!(report, TickReport::default());
        assert!(agent.runs.lock().is_empty());
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn test_agent_error_commits_fail_event() {
        let (tracker, _dir) = tracker();
        let agent = Arc::new(RecordingAgent {
            fail_with: Some("Too many concurrent LLM calls".to_string()),
            ..Default::default()
        });
        let scheduler = TaskScheduler::new(tracker, agent);
        let store = InMemoryTaskStore::with_tasks(vec![due_task("t1")]);

        let report = scheduler.check_and_execute_tasks("s1", &store).await.unwrap();
        assert_eq!(report.failed, 1);

        let events = store.events();
        assert_eq!(events.len(), 2);
        match &events[1] {
            TaskExecutionEvent::Fail { error, task_id, .. } => {
                assert_eq!(task_id, "t1");
                assert!(error.contains("Too many concurrent LLM calls"));
            }
            other => panic!("expected fail event, got {:?}", other),
        }
        let json = serde_json::to_value(&events[1]).unwrap();
        assert_eq!(json["status"], "failed");
        // The claim stays, so the failed occurrence is not retried on the next tick.
        assert_eq!(scheduler.stats(Some("s1")).unwrap().processed_executions, 1);
    }

    #[tokio::test]
    async fn test_stores_are_isolated() {
        let (tracker, _dir) = tracker();
        let agent = Arc::new(RecordingAgent::default());
        let scheduler = TaskScheduler::new(tracker, agent.clone());
        let task = due_task("shared-id");
        let store_a = InMemoryTaskStore::with_tasks(vec![task.clone()]);
        let store_b = InMemoryTaskStore::with_tasks(vec![task]);

        scheduler.check_and_execute_tasks("a", &store_a).await.unwrap();
        scheduler.check_and_execute_tasks("b", &store_b).await.unwrap();

        assert_eq!(agent.runs.lock().len(), 2);
        assert_eq!(scheduler.stats(Some("a")).unwrap().processed_executions, 1);
        assert_eq!(scheduler.stats(None).unwrap().processed_executions, 2);
    }

    #[tokio::test]
    async fn test_new_due_time_runs_again() {
        let (tracker, _dir) = tracker();
        let agent = Arc::new(RecordingAgent::default());
        let scheduler = TaskScheduler::new(tracker, agent.clone());
        let store = InMemoryTaskStore::with_tasks(vec![due_task("t1")]);

        scheduler.check_and_execute_tasks("s1", &store).await.unwrap();
        store.set_next_execution_at("t1", Some(Utc::now() - Duration::seconds(1)));
        scheduler.check_and_execute_tasks("s1", &store).await.unwrap();

        assert_eq!(agent.runs.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_and_close() {
        let (tracker, _dir) = tracker();
        let scheduler = TaskScheduler::new(tracker, Arc::new(RecordingAgent::default()));
        let store = InMemoryTaskStore::with_tasks(vec![due_task("t1"), due_task("t2")]);
        scheduler.check_and_execute_tasks("s1", &store).await.unwrap();

        assert_eq!(scheduler.cleanup(0).unwrap(), 2);
        assert_eq!(scheduler.stats(None).unwrap().processed_executions, 0);
        assert_eq!(scheduler.cleanup(0).unwrap(), 0);

        scheduler.close();
        assert!(scheduler.stats(None).is_err());
    }

    #[tokio::test]
    async fn test_loop_agent_passes_project_as_board_context() {
        let llm = MockLlmClient::from_steps("mock", vec![MockStep::text("summary written")]);
        let executor = Arc::new(ToolExecutor::new(Arc::new(ToolRegistry::new())));
        let agent = LoopTaskAgent::new(
            Arc::new(llm.clone()),
            executor,
            Arc::new(ResourceMonitor::default()),
            LoopConfig::default(),
        );
        let task = due_task("t1").with_project("proj-9");

        let summary = agent.run_task("s1", &task).await.unwrap();

        assert_eq!(summary.final_message.as_deref(), Some("summary written"));
        let requests = llm.requests().await;
        assert_eq!(
            requests[0].board_context,
            Some(json!({ "project_id": "proj-9" }))
        );
        assert_eq!(requests[0].messages.last().unwrap().content, "run t1");
    }

    #[tokio::test]
    async fn test_cancelled_run_commits_fail_event() {
        let (tracker, _dir) = tracker();
        let llm = MockLlmClient::from_steps("mock", vec![MockStep::text("never reached")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let agent = LoopTaskAgent::new(
            Arc::new(llm.clone()),
            Arc::new(ToolExecutor::new(Arc::new(ToolRegistry::new()))),
            Arc::new(ResourceMonitor::default()),
            LoopConfig::default(),
        )
        .with_cancel(cancel);
        let scheduler = TaskScheduler::new(tracker, Arc::new(agent));
        let store = InMemoryTaskStore::with_tasks(vec![due_task("t1")]);

        let report = scheduler.check_and_execute_tasks("s1", &store).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 0);
        assert_eq!(llm.call_count().await, 0);
        let events = store.events();
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["task_execution.start", "task_execution.fail"]);
        let TaskExecutionEvent::Fail { error, .. } = &events[1] else {
            panic!("expected fail event");
        };
        assert!(error.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_default_tracing_observer_runs_to_completion() {
        let llm = MockLlmClient::from_steps(
            "mock",
            vec![
                MockStep::tool_call("call-1", "missing_tool", json!({})),
                MockStep::text("wrapped up"),
            ],
        );
        let agent = LoopTaskAgent::new(
            Arc::new(llm.clone()),
            Arc::new(ToolExecutor::new(Arc::new(ToolRegistry::new()))),
            Arc::new(ResourceMonitor::default()),
            LoopConfig::default(),
        );

        let summary = agent.run_task("s1", &due_task("t1")).await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.iterations, 2);
        assert_eq!(llm.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_loop_agent_surfaces_resource_exhaustion() {
        let monitor = Arc::new(ResourceMonitor::default());
        monitor.update_limits(taskloom_ai::resource::ResourceLimitsUpdate {
            max_concurrent_llm_calls: Some(0),
            ..Default::default()
        });
        let agent = LoopTaskAgent::new(
            Arc::new(MockLlmClient::new("mock")),
            Arc::new(ToolExecutor::new(Arc::new(ToolRegistry::new()))),
            monitor,
            LoopConfig::default(),
        );

        let err = agent.run_task("s1", &due_task("t1")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AiError>(),
            Some(AiError::ResourceExhausted(
                ResourceError::ConcurrentCallsExceeded { .. }
            ))
        ));
    }
}
