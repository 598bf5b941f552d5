//! Task store implementations shipped with the orchestrator.

mod memory;

pub use memory::InMemoryTaskStore;
