//! Key-value persistence for [`Config`] (TOML)

use crate::config::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Where configuration values live between runs.
pub trait SettingsStore: Send + Sync {
    /// Stored values; absent keys (or an absent store) yield defaults.
    fn load(&self) -> Result<Config>;
    fn save(&self, config: &Config) -> Result<()>;
}

/// Settings kept in a TOML file, one key per setting
/// (`memoryThreshold = 95.0`, ...).
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_default_path() -> Self {
        Self::new(Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "memwatch")
            .map(|dirs| dirs.config_dir().join("settings.toml"))
            .unwrap_or_else(|| PathBuf::from("settings.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {:?}", self.path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid settings in {:?}", self.path))?;
        Ok(config)
    }

    fn save(&self, config: &Config) -> Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to encode settings")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write settings to {:?}", self.path))?;
        Ok(())
    }
}

/// In-process store; clones share the same slot.
#[derive(Clone, Default)]
pub struct MemorySettingsStore {
    saved: Arc<Mutex<Option<Config>>>,
}

impl MemorySettingsStore {
    pub fn with_config(config: Config) -> Self {
        Self {
            saved: Arc::new(Mutex::new(Some(config))),
        }
    }

    /// Last saved values, if any.
    pub fn saved(&self) -> Option<Config> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Config> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, config: &Config) -> Result<()> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        Ok(())
    }
}
