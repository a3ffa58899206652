use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::layout::Orientation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReaderConfig {
    /// Orientation used until the host reports one.
    pub orientation: Orientation,
    /// Whether pages open with drawing input enabled.
    pub annotation_mode: bool,
    pub autosave: AutosaveConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
    pub write_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            write_retries: 2,
            retry_backoff_ms: 50,
        }
    }
}

impl AutosaveConfig {
    /// Writes go out as soon as they are scheduled, with no retries.
    pub fn immediate() -> Self {
        Self {
            debounce_ms: 0,
            write_retries: 0,
            retry_backoff_ms: 0,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl ReaderConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config file {:?}", path))
    }
}

/// Platform directories for configuration, annotation state and logs.
#[derive(Debug, Clone)]
pub struct AppDirs {
    pub config_file: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppDirs {
    pub fn resolve() -> Result<Self> {
        let project_dirs = ProjectDirs::from("org", "mushaf", "mushaf")
            .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
        Ok(Self {
            config_file: project_dirs.config_dir().join("config.toml"),
            state_dir: project_dirs.data_local_dir().join("state"),
            log_dir: project_dirs.data_local_dir().join("logs"),
        })
    }

    pub fn load_config(&self) -> Result<ReaderConfig> {
        ReaderConfig::load(&self.config_file)
    }
}
