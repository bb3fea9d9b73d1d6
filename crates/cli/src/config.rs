//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Log read when neither the flag, the environment nor the config file names one
pub const DEFAULT_LOG_PATH: &str = "system_monitor.csv";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Telemetry log to read
    pub log_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the user config file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to the user config file
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("telem").join("config.json"))
    }

    /// Pick the log path: explicit override, then config file, then default
    pub fn resolve_log_path(&self, override_path: Option<PathBuf>) -> PathBuf {
        override_path
            .or_else(|| self.log_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH))
    }
}
