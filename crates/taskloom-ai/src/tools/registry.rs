//! Name-indexed set of tools available to one agent.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::tools::traits::{Tool, ToolSchema};

/// Tools keyed by name. Iteration order is alphabetical, so prompts and
/// schema lists are stable across runs.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name is replaced.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.insert(Arc::new(tool));
    }

    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replaced previously registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|tool| ToolSchema::describe(tool.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tools::traits::{ToolContext, ToolOutput};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "Returns its own name"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            Ok(ToolOutput::success(json!(self.0)))
        }
    }

    #[test]
    fn test_schemas_are_sorted_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(NamedTool("update_board"));
        registry.register(NamedTool("create_note"));

        assert_eq!(registry.list(), vec!["create_note", "update_board"]);
        let schemas = registry.schemas();
        assert_eq!(schemas[0].name, "create_note");
        assert_eq!(schemas[0].description, "Returns its own name");
        assert_eq!(schemas[1].parameters, json!({"type": "object"}));
    }

    #[test]
    fn test_same_name_replaces() {
        let mut registry = ToolRegistry::new();
        registry.register(NamedTool("create_note"));
        registry.insert(Arc::new(NamedTool("create_note")));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("create_note"));
        assert!(!registry.contains("delete_note"));
        assert!(registry.get("delete_note").is_none());
    }
}
