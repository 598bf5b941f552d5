//! Taskloom Traits - Shared data model and store abstractions.
//!
//! This crate provides the interfaces shared across the Taskloom workspace:
//! - `RecurringTaskDefinition`, the store-owned recurring task row
//! - `TaskExecutionEvent`, the lifecycle events committed by the scheduler
//! - `StoreQuery` and the `TaskStore` trait implemented by data stores

pub mod event;
pub mod store;
pub mod task;

pub use event::{ExecutionStatus, TaskExecutionEvent};
pub use store::{StoreQuery, TaskStore};
pub use task::RecurringTaskDefinition;
