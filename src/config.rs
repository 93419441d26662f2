use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gates: GateConfig,
    #[serde(default)]
    pub questions: QuestionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Executable name, resolved through the locator.
    pub command: String,
    /// Explicit path override; checked before the search path.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Base argument list. The prompt flag and prompt text are appended as
    /// the final two arguments at launch.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_prompt_flag")]
    pub prompt_flag: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Environment overrides; win over the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_tool_permission_timeout_secs")]
    pub tool_permission_timeout_secs: u64,
}

impl AgentConfig {
    pub fn tool_permission_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_permission_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    /// Confidence scores below this raise a gate after the producing run.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Stage labels that always gate, regardless of confidence.
    #[serde(default)]
    pub mandatory_stages: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            mandatory_stages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuestionConfig {
    /// The one reserved tool name the question coordinator intercepts.
    #[serde(default = "default_question_tool")]
    pub tool_name: String,
    #[serde(default = "default_question_timeout_secs")]
    pub timeout_secs: u64,
}

impl QuestionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            tool_name: default_question_tool(),
            timeout_secs: default_question_timeout_secs(),
        }
    }
}

fn default_prompt_flag() -> String {
    "-p".to_string()
}

fn default_tool_permission_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_question_tool() -> String {
    "AskUserQuestion".to_string()
}

fn default_question_timeout_secs() -> u64 {
    300
}

impl OrchestratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        const DEFAULT_YAML: &str = include_str!("../foreman.yaml");

        serde_yaml::from_str(DEFAULT_YAML)
            .expect("Failed to parse embedded foreman.yaml - this is a bug in the foreman.yaml file")
    }

    fn validate(&self) -> Result<()> {
        if self.agent.command.trim().is_empty() {
            anyhow::bail!("agent.command must not be empty");
        }
        if self.scheduler.max_retries == 0 {
            anyhow::bail!("scheduler.max_retries must be at least 1");
        }
        if self.scheduler.poll_interval_secs == 0 {
            anyhow::bail!("scheduler.poll_interval_secs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.gates.confidence_threshold) {
            anyhow::bail!(
                "gates.confidence_threshold must be within 0.0..=1.0, got {}",
                self.gates.confidence_threshold
            );
        }
        if self.questions.tool_name.trim().is_empty() {
            anyhow::bail!("questions.tool_name must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
