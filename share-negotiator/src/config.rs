//! Configuration management for the share negotiator.
//!
//! Loads configuration from a TOML file; every field has a default.

use crate::fs::walker::WalkOptions;
use crate::utils::errors::{NegotiationError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Local identity announced to peers
    #[serde(default = "default_agent_id")]
    pub id: String,

    /// Working directory for persistent state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory that holds every container
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,

    /// Initial value of the automatic-build flag
    #[serde(default = "default_auto_build")]
    pub auto_build: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Follow symbolic links while building local manifests
    #[serde(default)]
    pub follow_links: bool,

    /// File or directory names skipped during scans (exact match)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database holding name mappings
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_agent_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "share-negotiator-01".to_string())
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/share-negotiator")
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_auto_build() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    default_data_dir().join("settings.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            auto_build: default_auto_build(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            workspace: WorkspaceConfig::default(),
            scan: ScanConfig::default(),
            store: StoreConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| NegotiationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workspace.root.as_os_str().is_empty() {
            return Err(NegotiationError::Config("workspace.root must not be empty".to_string()));
        }
        if self.store.db_path.as_os_str().is_empty() {
            return Err(NegotiationError::Config("store.db_path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            follow_links: self.scan.follow_links,
            max_depth: None,
            exclude_patterns: self.scan.exclude_patterns.clone(),
        }
    }
}
