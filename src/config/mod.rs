use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    agent::types::AgentConfig,
    error::Result,
    multi_agent::{coordination::DelegationConfig, registry::RegistryConfig},
    workflow::WorkflowSettings,
};

/// Executor defaults applied to agents built from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub default_max_iterations: u32,
    pub memory_window: usize,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            default_max_iterations: 10,
            memory_window: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    pub max_steps: usize,
    pub human_input_timeout_ms: Option<u64>,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_steps: 100,
            human_input_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub staleness_window_ms: u64,
    pub sweep_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            staleness_window_ms: 30_000,
            sweep_interval_ms: 60_000,
            heartbeat_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationSection {
    pub default_timeout_ms: u64,
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub executor: ExecutorSection,
    pub workflow: WorkflowSection,
    pub registry: RegistrySection,
    pub delegation: DelegationSection,
    pub logging: LogConfig,
}

impl OrchestratorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Applies `RUSORCHESTRA_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("RUSORCHESTRA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(steps) = env_number("RUSORCHESTRA_MAX_STEPS") {
            self.workflow.max_steps = steps as usize;
        }
        if let Some(timeout) = env_number("RUSORCHESTRA_DELEGATION_TIMEOUT_MS") {
            self.delegation.default_timeout_ms = timeout;
        }
        self
    }

    /// Agent configuration carrying the executor defaults.
    pub fn agent_config(&self, name: &str, model: &str) -> AgentConfig {
        AgentConfig::new(name, model)
            .with_max_iterations(self.executor.default_max_iterations)
            .with_memory(true, self.executor.memory_window)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            staleness_window: Duration::from_millis(self.registry.staleness_window_ms),
            sweep_interval: Duration::from_millis(self.registry.sweep_interval_ms),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.registry.heartbeat_interval_ms)
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            max_steps: self.workflow.max_steps,
            human_input_timeout: self.workflow.human_input_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn delegation_config(&self) -> DelegationConfig {
        DelegationConfig {
            default_timeout: Duration::from_millis(self.delegation.default_timeout_ms),
        }
    }
}

fn env_number(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}: '{}' is not a number", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            [workflow]
            max_steps = 12

            [registry]
            staleness_window_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.workflow.max_steps, 12);
        assert_eq!(config.registry.staleness_window_ms, 500);
        assert_eq!(config.registry.sweep_interval_ms, 60_000);
        assert_eq!(config.delegation.default_timeout_ms, 30_000);
        assert_eq!(
            config.registry_config().staleness_window,
            Duration::from_millis(500)
        );

        let agent = config.agent_config("writer", "gpt");
        assert_eq!(agent.max_iterations, 10);
        assert_eq!(agent.memory_window, 20);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = OrchestratorConfig::from_toml_str("workflow = 3").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
