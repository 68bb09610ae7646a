use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::{BeanType, Priority, Status};

/// Name of the quarantine directory under the beans root.
pub const QUARANTINE_DIR: &str = ".quarantine";

/// Workspace settings shared with the `beans` backend (`.beans.yml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Beans directory, relative to the workspace root.
    #[serde(default = "default_beans_path")]
    pub path: PathBuf,
    /// Id prefix used when an id has to be synthesized.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_id_length")]
    pub id_length: usize,
    #[serde(default = "default_status")]
    pub default_status: Status,
    #[serde(default = "default_type")]
    pub default_type: BeanType,
    #[serde(default = "all_statuses")]
    pub statuses: Vec<Status>,
    #[serde(default = "all_types")]
    pub types: Vec<BeanType>,
    #[serde(default = "all_priorities")]
    pub priorities: Vec<Priority>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: default_beans_path(),
            prefix: default_prefix(),
            id_length: default_id_length(),
            default_status: default_status(),
            default_type: default_type(),
            statuses: all_statuses(),
            types: all_types(),
            priorities: all_priorities(),
        }
    }
}

impl WorkspaceConfig {
    #[must_use]
    pub fn allows_status(&self, status: Status) -> bool {
        self.statuses.contains(&status)
    }

    #[must_use]
    pub fn allows_type(&self, bean_type: BeanType) -> bool {
        self.types.contains(&bean_type)
    }

    #[must_use]
    pub fn allows_priority(&self, priority: Priority) -> bool {
        self.priorities.contains(&priority)
    }

    /// Absolute beans root for a workspace.
    #[must_use]
    pub fn beans_root(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(&self.path)
    }
}

#[derive(Debug, Deserialize)]
struct BeansFile {
    #[serde(default)]
    beans: Option<WorkspaceConfig>,
}

/// Engine settings owned by beanpod itself (`<config_dir>/beanpod/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_backend_program")]
    pub backend_program: String,
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
    /// Upper bound on revisions inspected per file during recovery.
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend_program: default_backend_program(),
            backend_timeout_ms: default_backend_timeout_ms(),
            history_depth: default_history_depth(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

pub fn load_workspace_config(workspace_root: &Path) -> Result<WorkspaceConfig> {
    let path = workspace_root.join(".beans.yml");
    if !path.exists() {
        return Ok(WorkspaceConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let parsed = serde_yaml::from_str::<Option<BeansFile>>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let config = parsed.and_then(|f| f.beans).unwrap_or_default();
    validate_workspace_config(&config)
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(config)
}

fn validate_workspace_config(config: &WorkspaceConfig) -> Result<()> {
    if !config.allows_status(config.default_status) {
        anyhow::bail!(
            "default_status '{}' is not one of the configured statuses",
            config.default_status
        );
    }
    if !config.allows_type(config.default_type) {
        anyhow::bail!(
            "default_type '{}' is not one of the configured types",
            config.default_type
        );
    }
    Ok(())
}

pub fn load_engine_config() -> Result<EngineConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(EngineConfig::default());
    };

    load_engine_config_from(&config_dir.join("beanpod/config.toml"))
}

pub fn load_engine_config_from(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EngineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn default_beans_path() -> PathBuf {
    PathBuf::from(".beans")
}

fn default_prefix() -> String {
    "beans-".to_string()
}

const fn default_id_length() -> usize {
    4
}

const fn default_status() -> Status {
    Status::Todo
}

const fn default_type() -> BeanType {
    BeanType::Task
}

fn all_statuses() -> Vec<Status> {
    Status::ALL.to_vec()
}

fn all_types() -> Vec<BeanType> {
    BeanType::ALL.to_vec()
}

fn all_priorities() -> Vec<Priority> {
    Priority::ALL.to_vec()
}

fn default_backend_program() -> String {
    "beans".to_string()
}

const fn default_backend_timeout_ms() -> u64 {
    10_000
}

const fn default_history_depth() -> usize {
    10
}
