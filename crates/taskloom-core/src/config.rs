//! Orchestrator configuration
//!
//! Loads configuration from ~/.config/taskloom/config.toml, then applies
//! `TASKLOOM_*` environment overrides.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use taskloom_ai::agent::{DEFAULT_MAX_ITERATIONS, LoopConfig, MAX_ITERATIONS_ENV};
use taskloom_ai::resource::ResourceLimits;
use taskloom_ai::tools::{DEFAULT_MAX_TOOL_RESULT_LENGTH, ToolExecutor, ToolRegistry};

pub const TRACKER_PATH_ENV: &str = "TASKLOOM_TRACKER_PATH";
pub const POLL_INTERVAL_SECS_ENV: &str = "TASKLOOM_POLL_INTERVAL_SECS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub resources: ResourceLimits,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

/// Agentic loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_tool_result_length: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model: None,
            system_prompt: None,
            max_tool_result_length: DEFAULT_MAX_TOOL_RESULT_LENGTH,
        }
    }
}

impl AgentSettings {
    pub fn loop_config(&self) -> LoopConfig {
        let mut config = LoopConfig::default().with_max_iterations(self.max_iterations);
        config.model = self.model.clone();
        config.system_prompt = self.system_prompt.clone();
        config
    }

    /// Executor over `registry` with the configured result length cap.
    pub fn tool_executor(&self, registry: Arc<ToolRegistry>) -> ToolExecutor {
        ToolExecutor::new(registry).with_max_result_length(self.max_tool_result_length)
    }
}

/// Scheduler and tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
    /// Claims older than this are removed by periodic cleanup.
    pub retention_days: u32,
    pub cleanup_interval_secs: u64,
    /// Defaults to `processed_executions.redb` in the Taskloom directory.
    pub tracker_path: Option<PathBuf>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            retention_days: 30,
            cleanup_interval_secs: 3600,
            tracker_path: None,
        }
    }
}

impl SchedulerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    pub fn tracker_path(&self) -> Result<PathBuf> {
        match &self.tracker_path {
            Some(path) => Ok(path.clone()),
            None => taskloom_storage::paths::default_tracker_path(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from the default path with environment overrides applied.
    pub fn load() -> Self {
        let mut config = Self::load_from_path(Self::default_path());
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load from a specific path. A missing or unreadable file yields defaults.
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("taskloom").join("config.toml"))
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.resources.apply_env_overrides(&lookup);

        if let Some(raw) = lookup(MAX_ITERATIONS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(value) => self.agent.max_iterations = value.max(1),
                Err(_) => warn!(env = MAX_ITERATIONS_ENV, value = %raw, "Ignoring invalid override"),
            }
        }
        if let Some(raw) = lookup(POLL_INTERVAL_SECS_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(value) => self.scheduler.poll_interval_secs = value,
                Err(_) => {
                    warn!(env = POLL_INTERVAL_SECS_ENV, value = %raw, "Ignoring invalid override")
                }
            }
        }
        if let Some(raw) = lookup(TRACKER_PATH_ENV)
            && !raw.trim().is_empty()
        {
            self.scheduler.tracker_path = Some(PathBuf::from(raw.trim()));
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use taskloom_ai::llm::ToolCall;
    use taskloom_ai::tools::{Tool, ToolContext, ToolOutput};

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = OrchestratorConfig::load_from_path(Some(PathBuf::from(
            "/nonexistent/taskloom/config.toml",
        )));
        assert_eq!(config.agent.max_iterations, 15);
        assert_eq!(config.scheduler.poll_interval_secs, 60);
        assert_eq!(config.scheduler.retention_days, 30);
        assert_eq!(config.resources, ResourceLimits::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[agent]
max_iterations = 8

[resources]
max_concurrent_llm_calls = 3

[scheduler]
retention_days = 7
tracker_path = "/var/lib/taskloom/claims.redb"
"#,
        )
        .unwrap();

        let config = OrchestratorConfig::load_from_path(Some(path));
        assert_eq!(config.agent.max_iterations, 8);
        assert_eq!(config.agent.max_tool_result_length, 4000);
        assert_eq!(config.resources.max_concurrent_llm_calls, 3);
        assert_eq!(config.resources.max_queued_messages, 1000);
        assert_eq!(config.scheduler.retention_days, 7);
        assert_eq!(config.scheduler.poll_interval_secs, 60);
        assert_eq!(
            config.scheduler.tracker_path().unwrap(),
            PathBuf::from("/var/lib/taskloom/claims.redb")
        );
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "agent = [not toml").unwrap();

        let config = OrchestratorConfig::load_from_path(Some(path));
        assert_eq!(config.agent.max_iterations, 15);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (MAX_ITERATIONS_ENV, "0"),
            ("TASKLOOM_MAX_CONCURRENT_LLM_CALLS", "2"),
            (POLL_INTERVAL_SECS_ENV, "5"),
            (TRACKER_PATH_ENV, "/tmp/claims.redb"),
        ]);
        let mut config = OrchestratorConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.agent.max_iterations, 1);
        assert_eq!(config.resources.max_concurrent_llm_calls, 2);
        assert_eq!(config.scheduler.poll_interval(), Duration::from_secs(5));
        assert_eq!(
            config.scheduler.tracker_path,
            Some(PathBuf::from("/tmp/claims.redb"))
        );
    }

    #[test]
    fn test_loop_config_from_settings() {
        let settings = AgentSettings {
            max_iterations: 4,
            model: Some("gpt-test".to_string()),
            ..Default::default()
        };
        let config = settings.loop_config();
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.model.as_deref(), Some("gpt-test"));
    }

    struct ReportTool;

    #[async_trait::async_trait]
    impl Tool for ReportTool {
        fn name(&self) -> &str {
            "weekly_report"
        }

        fn description(&self) -> &str {
            "Render the weekly report"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: &ToolContext,
        ) -> taskloom_ai::Result<ToolOutput> {
            Ok(ToolOutput::success(serde_json::json!("x".repeat(50))))
        }
    }

    #[tokio::test]
    async fn test_tool_executor_applies_result_length() {
        let settings = AgentSettings {
            max_tool_result_length: 12,
            ..Default::default()
        };
        let mut registry = ToolRegistry::new();
        registry.register(ReportTool);
        let executor = settings.tool_executor(Arc::new(registry));

        let results = executor
            .execute_tools(&[ToolCall::new("call-1", "weekly_report", serde_json::json!({}))])
            .await;

        assert_eq!(
            results[0].content,
            format!("\"{}...[truncated, 52 chars total]", "x".repeat(11))
        );
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = OrchestratorConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: OrchestratorConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.agent.max_iterations, config.agent.max_iterations);
        assert_eq!(parsed.resources, config.resources);
    }
}
