//! Taskloom Core - recurring task orchestration
//!
//! Wires the agent runtime (`taskloom-ai`) and the processed-execution
//! tracker (`taskloom-storage`) into a scheduler that runs due recurring
//! tasks exactly once per due time:
//!
//! - [`scheduler::TaskScheduler`] ticks one store
//! - [`runner::SchedulerRunner`] ticks every registered store on an interval
//! - [`config::OrchestratorConfig`] loads settings from TOML and the environment
//! - [`logging::init_logging`] installs the tracing subscriber

pub mod config;
pub mod logging;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use config::{AgentSettings, OrchestratorConfig, SchedulerSettings};
pub use runner::{RunnerConfig, RunnerHandle, SchedulerRunner};
pub use scheduler::{LoopTaskAgent, SchedulerStats, TaskAgent, TaskScheduler, TickReport};
pub use store::InMemoryTaskStore;
