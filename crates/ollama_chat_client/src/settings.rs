//! Host settings seam: reading named options, declaring them with labels, and a
//! YAML-backed store at `~/.ollama-chat/settings.yaml` for the terminal front end.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{OllamaConfig, HOST_KEY, MODELS_KEY, MODEL_KEY};

/// Read access to host-provided options.
pub trait SettingsStore {
    /// Value of `key`, or `None` when the store does not expose it.
    fn get(&self, key: &str) -> Option<String>;
}

impl SettingsStore for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl SettingsStore for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// Settings page section: (id, display label).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub id: &'static str,
    pub label: &'static str,
}

pub const OLLAMA_SECTION: Section = Section {
    id: "ollama",
    label: "Ollama",
};

/// Declaration of one option: default value, human-readable label, section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionInfo {
    pub default: String,
    pub label: String,
    pub section: Section,
}

/// Write side of the host settings: declare options once at startup.
pub trait SettingsRegistry {
    fn add_option(&mut self, key: &str, info: OptionInfo);
}

impl SettingsRegistry for Vec<(String, OptionInfo)> {
    fn add_option(&mut self, key: &str, info: OptionInfo) {
        self.push((key.to_string(), info));
    }
}

/// Declare the three chat options, defaulting to the values in `config`.
pub fn register_settings(config: &OllamaConfig, registry: &mut dyn SettingsRegistry) {
    registry.add_option(
        HOST_KEY,
        OptionInfo {
            default: config.default_host.clone(),
            label: "Default Ollama host".into(),
            section: OLLAMA_SECTION,
        },
    );
    registry.add_option(
        MODEL_KEY,
        OptionInfo {
            default: config.default_model.clone(),
            label: "Default Ollama model".into(),
            section: OLLAMA_SECTION,
        },
    );
    registry.add_option(
        MODELS_KEY,
        OptionInfo {
            default: config.models_setting(),
            label: "Available Ollama models (comma-separated)".into(),
            section: OLLAMA_SECTION,
        },
    );
}

/// Flat key/value settings persisted as YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsFile {
    values: BTreeMap<String, String>,
}

impl SettingsFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl SettingsStore for SettingsFile {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Registering fills in the default only where the user has no value yet.
impl SettingsRegistry for SettingsFile {
    fn add_option(&mut self, key: &str, info: OptionInfo) {
        if !self.values.contains_key(key) {
            debug!(key, default = %info.default, "registering default option");
            self.values.insert(key.to_string(), info.default);
        }
    }
}

/// Settings load/save error.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Returns the default settings path: `~/.ollama-chat/settings.yaml`.
pub fn default_settings_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".ollama-chat").join("settings.yaml"))
}

/// Load settings from a YAML file.
pub fn load(path: &Path) -> Result<SettingsFile, SettingsError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(SettingsFile::new());
    }
    Ok(serde_yaml::from_str(&contents)?)
}

/// Like [`load`], but a missing file yields empty settings.
pub fn load_or_default(path: &Path) -> Result<SettingsFile, SettingsError> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, starting empty");
        return Ok(SettingsFile::new());
    }
    load(path)
}

/// Save settings to a YAML file. Creates the parent directory if missing.
pub fn save(path: &Path, settings: &SettingsFile) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(settings)?;
    std::fs::write(path, contents)?;
    Ok(())
}
