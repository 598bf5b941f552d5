//! Taskloom Storage - Persistence for the orchestrator
//!
//! This crate provides the durable pieces of the orchestrator, using redb as
//! the embedded database.
//!
//! # Tables
//!
//! - `processed_executions` - Claims for processed `(store, task, due time)` triples

pub mod paths;
pub mod processed_execution;
mod time_utils;

pub use processed_execution::{ExecutionClaim, ProcessedExecutionTracker};
pub use time_utils::now_ms;
