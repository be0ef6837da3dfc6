use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use crate::cache::{CacheStore, DiskStore, InMemoryStore};
use crate::constants::{
    CONFIG_PATH_ENV, DEFAULT_EXEC_TIMEOUT, DEFAULT_WORK_ROOT_NAME, PARALLELISM_LIMIT_ENV,
};
use crate::models::ConfigManagementPlugin;
use crate::utils::platform::{find_executable, get_git_command, resolve_path};

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum concurrent renders; 0 or less disables the limit
    pub parallelism_limit: i64,

    /// Root directory for repository clones; supports `~` and `$VAR`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_root: Option<String>,

    /// Timeout for external tools in seconds; 0 disables it
    pub exec_timeout_secs: u64,

    /// Content cache backend
    pub cache: CacheConfig,

    /// External tool executables
    pub tools: ToolPaths,

    /// Registered config management plugins
    pub plugins: Vec<ConfigManagementPlugin>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            parallelism_limit: 0,
            work_root: None,
            exec_timeout_secs: DEFAULT_EXEC_TIMEOUT.as_secs(),
            cache: CacheConfig::default(),
            tools: ToolPaths::default(),
            plugins: Vec::new(),
        }
    }
}

/// Cache storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local map
    #[default]
    Memory,
    /// One file per entry under `dir`
    Disk,
}

/// Cache settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage backend
    pub backend: CacheBackend,
    /// Directory for the disk backend; supports `~` and `$VAR`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// Executables for the external tools, as names on `PATH` or full paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// git
    pub git: String,
    /// helm (v3 command line)
    pub helm: String,
    /// kustomize
    pub kustomize: String,
    /// ksonnet
    pub ks: String,
    /// jsonnet evaluator
    pub jsonnet: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            git: get_git_command().to_string(),
            helm: "helm".to_string(),
            kustomize: "kustomize".to_string(),
            ks: "ks".to_string(),
            jsonnet: "jsonnet".to_string(),
        }
    }
}

impl ToolPaths {
    /// Tools that cannot be found, as (tool, configured executable) pairs.
    #[must_use]
    pub fn unavailable(&self) -> Vec<(&'static str, &str)> {
        [
            ("git", self.git.as_str()),
            ("helm", self.helm.as_str()),
            ("kustomize", self.kustomize.as_str()),
            ("ks", self.ks.as_str()),
            ("jsonnet", self.jsonnet.as_str()),
        ]
        .into_iter()
        .filter(|(_, program)| find_executable(program).is_none())
        .collect()
    }
}

impl ServerConfig {
    /// Load configuration from `path`, or from the default location when
    /// `path` is `None`, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if an environment override is malformed.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path),
            None => match std::env::var(CONFIG_PATH_ENV) {
                Ok(p) if !p.is_empty() => Some(PathBuf::from(p)),
                _ => Self::default_path().ok(),
            },
        };

        let mut config = match path {
            Some(path) if path.exists() => Self::load_from(&path).await?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Default config file location.
    ///
    /// # Errors
    ///
    /// Returns an error if the home (or local data) directory is unknown.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("reposerve")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".reposerve")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Apply `REPOSERVE_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an override cannot be parsed.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(PARALLELISM_LIMIT_ENV)
            && !value.trim().is_empty()
        {
            self.parallelism_limit = value
                .trim()
                .parse()
                .with_context(|| format!("{PARALLELISM_LIMIT_ENV} must be an integer, got '{value}'"))?;
        }
        Ok(())
    }

    /// Resolved clone root.
    ///
    /// # Errors
    ///
    /// Returns an error if `work_root` references an unset variable.
    pub fn work_root_path(&self) -> Result<PathBuf> {
        match &self.work_root {
            Some(root) => resolve_path(root),
            None => Ok(std::env::temp_dir().join(DEFAULT_WORK_ROOT_NAME)),
        }
    }

    /// Timeout for external tools.
    #[must_use]
    pub const fn exec_timeout(&self) -> Option<Duration> {
        if self.exec_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.exec_timeout_secs))
        }
    }

    /// Storage backend described by the `[cache]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if the disk directory cannot be resolved.
    pub fn cache_store(&self) -> Result<Arc<dyn CacheStore>> {
        match self.cache.backend {
            CacheBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
            CacheBackend::Disk => {
                let dir = match &self.cache.dir {
                    Some(dir) => resolve_path(dir)?,
                    None => dirs::cache_dir()
                        .ok_or_else(|| anyhow::anyhow!("Unable to determine cache directory"))?
                        .join("reposerve"),
                };
                tracing::debug!(target: "cache", "Using disk cache at {}", dir.display());
                Ok(Arc::new(DiskStore::new(dir)))
            }
        }
    }
}
