//! Configuration management for `pm`.
//!
//! This module handles the `.pm/config.yaml` file. When a project has none,
//! `<config dir>/pm/config.yaml` is used, and failing that the defaults.

use crate::error::Result;
use crate::paths;
use crate::tasks::store::StoreOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file path relative to project root.
pub const CONFIG_FILE_PATH: &str = ".pm/config.yaml";

const fn default_busy_timeout_ms() -> u64 {
    5000
}

const fn default_true() -> bool {
    true
}

/// Settings for the CLI and store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Append one line per command to `.pm/command-log.jsonl`.
    #[serde(default)]
    pub debug_logging: bool,

    /// How long to wait for another process's write lock, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Whether a task may depend on a task in another project.
    #[serde(default = "default_true")]
    pub allow_cross_project_dependencies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_logging: false,
            busy_timeout_ms: default_busy_timeout_ms(),
            allow_cross_project_dependencies: true,
        }
    }
}

impl Config {
    /// Load config from a specific project root, returning None if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_from(base_dir: &Path) -> Result<Option<Self>> {
        Self::load_file(&Self::config_path(base_dir))
    }

    /// Load config from an explicit file, returning None if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        // An empty file deserializes to unit; treat it as all defaults.
        if content.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(Some(config))
    }

    /// Load the project config, falling back to the user config, then defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn resolve(base_dir: &Path) -> Result<Self> {
        Self::resolve_with(base_dir, paths::user_config_path().as_deref())
    }

    /// Like [`Config::resolve`] with the user config path passed in.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn resolve_with(base_dir: &Path, user_config: Option<&Path>) -> Result<Self> {
        if let Some(config) = Self::load_from(base_dir)? {
            return Ok(config);
        }
        if let Some(path) = user_config {
            if let Some(config) = Self::load_file(path)? {
                return Ok(config);
            }
        }
        Ok(Self::default())
    }

    /// Save config to a specific project root.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, base_dir: &Path) -> Result<()> {
        let config_path = Self::config_path(base_dir);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Get the config file path for a project root.
    pub fn config_path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE_PATH)
    }

    /// Connection options derived from this config.
    #[must_use]
    pub const fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            allow_cross_project_dependencies: self.allow_cross_project_dependencies,
        }
    }
}
