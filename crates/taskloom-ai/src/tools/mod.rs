//! Tools module: the tool trait, the named registry and the executor that
//! turns LLM tool calls into tool-result messages.

mod executor;
mod registry;
mod traits;

pub use executor::{
    DEFAULT_MAX_TOOL_RESULT_LENGTH, ToolExecutor, ToolObserver, TracingToolObserver,
};
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolContext, ToolOutput, ToolSchema};
