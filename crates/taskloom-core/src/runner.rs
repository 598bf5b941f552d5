//! Background runner that ticks the scheduler for every registered store.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use taskloom_traits::TaskStore;

use crate::config::SchedulerSettings;
use crate::scheduler::{TaskScheduler, TickReport};

/// Message types for controlling the runner
#[derive(Debug)]
pub enum RunnerCommand {
    /// Stop the runner
    Stop,
    /// Tick every store immediately
    CheckNow,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention_days: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

impl From<&SchedulerSettings> for RunnerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            cleanup_interval: settings.cleanup_interval(),
            retention_days: settings.retention_days,
        }
    }
}

/// Handle to control a running [`SchedulerRunner`]
pub struct RunnerHandle {
    command_tx: mpsc::Sender<RunnerCommand>,
    join: JoinHandle<()>,
}

impl RunnerHandle {
    /// Stop the runner
    pub async fn stop(&self) -> Result<()> {
        self.command_tx
            .send(RunnerCommand::Stop)
            .await
            .map_err(|e| anyhow!("Failed to send stop command: {}", e))
    }

    /// Trigger an immediate tick of every store
    pub async fn check_now(&self) -> Result<()> {
        self.command_tx
            .send(RunnerCommand::CheckNow)
            .await
            .map_err(|e| anyhow!("Failed to send check command: {}", e))
    }

    /// Wait for the run loop to exit.
    pub async fn join(self) -> Result<()> {
        self.join
            .await
            .map_err(|e| anyhow!("Scheduler runner task failed: {}", e))
    }
}

pub struct SchedulerRunner {
    scheduler: Arc<TaskScheduler>,
    stores: Vec<(String, Arc<dyn TaskStore>)>,
    config: RunnerConfig,
}

impl SchedulerRunner {
    pub fn new(scheduler: Arc<TaskScheduler>, config: RunnerConfig) -> Self {
        Self {
            scheduler,
            stores: Vec::new(),
            config,
        }
    }

    pub fn with_store(mut self, store_id: impl Into<String>, store: Arc<dyn TaskStore>) -> Self {
        self.stores.push((store_id.into(), store));
        self
    }

    /// Start the runner and return a handle for controlling it
    pub fn start(self: Arc<Self>) -> RunnerHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        let runner = self.clone();

        let join = tokio::spawn(async move {
            runner.run_loop(command_rx).await;
        });

        RunnerHandle { command_tx, join }
    }

    async fn run_loop(self: Arc<Self>, mut command_rx: mpsc::Receiver<RunnerCommand>) {
        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup_interval = interval(self.config.cleanup_interval);
        cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first cleanup tick.
        cleanup_interval.tick().await;

        info!(
            "SchedulerRunner started (stores={}, poll_interval={}s)",
            self.stores.len(),
            self.config.poll_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    self.tick_all().await;
                }
                _ = cleanup_interval.tick() => {
                    self.run_cleanup();
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(RunnerCommand::Stop) => {
                            info!("SchedulerRunner stopping...");
                            break;
                        }
                        Some(RunnerCommand::CheckNow) => {
                            debug!("Manual check triggered");
                            self.tick_all().await;
                        }
                        None => {
                            info!("Command channel closed, stopping runner");
                            break;
                        }
                    }
                }
            }
        }

        info!("SchedulerRunner stopped");
    }

    /// Tick every store concurrently.
    pub async fn tick_all(&self) -> Vec<(String, TickReport)> {
        let ticks = self.stores.iter().map(|(store_id, store)| async move {
            let result = self
                .scheduler
                .check_and_execute_tasks(store_id, store.as_ref())
                .await;
            (store_id.clone(), result)
        });

        let mut reports = Vec::with_capacity(self.stores.len());
        for (store_id, result) in join_all(ticks).await {
            match result {
                Ok(report) => reports.push((store_id, report)),
                Err(e) => warn!(store_id = %store_id, error = %e, "Scheduler tick failed"),
            }
        }
        reports
    }

    fn run_cleanup(&self) {
        if let Err(e) = self.scheduler.cleanup(self.config.retention_days) {
            warn!(error = %e, "Processed execution cleanup failed");
        }
    }
}
