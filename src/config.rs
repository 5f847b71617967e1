use crate::domains::sessions::entity::{SessionConfig, ToolsConfig};
use crate::errors::DaemonError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Daemon configuration, read from a TOML file. Every field has a default so
/// a missing file or an empty one yields a runnable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Base directory for sessions created without an explicit workspace.
    pub workspace_root: PathBuf,
    /// Database file location; `None` falls back to the platform data dir.
    pub database_path: Option<PathBuf>,
    /// Whether git workspaces get an isolated worktree per session.
    pub worktrees_enabled: bool,
    pub session: SessionDefaults,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            database_path: None,
            worktrees_enabled: true,
            session: SessionDefaults::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            model: "sonnet".to_string(),
            max_tokens: 8192,
            temperature: 1.0,
        }
    }
}

impl DaemonConfig {
    /// Loads the configuration. An explicit path must exist and parse; with
    /// no explicit path, the platform config location is used if present and
    /// compiled defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.session.max_tokens == 0 {
            return Err(DaemonError::config(
                "session.max_tokens",
                "must be greater than zero",
            ));
        }
        if !(0.0..=2.0).contains(&self.session.temperature) {
            return Err(DaemonError::config(
                "session.temperature",
                "must be between 0.0 and 2.0",
            ));
        }
        Ok(())
    }

    /// The per-session configuration new sessions start from.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.session.model.clone(),
            max_tokens: self.session.max_tokens,
            temperature: self.session.temperature,
            ..SessionConfig::default()
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("leitwerk").join("leitwerk.toml"))
}

fn default_workspace_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("leitwerk")
}
