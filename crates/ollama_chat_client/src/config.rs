//! Chat configuration: default host, default model, and the selectable model list.
//! Built-in defaults are overridden field by field from a host settings store.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::settings::SettingsStore;

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "mistral-nemo";
pub const DEFAULT_MODELS: [&str; 3] = ["mistral-nemo", "llama3.2", "gdisney/mistral-uncensored"];

/// Settings key for [`OllamaConfig::default_host`].
pub const HOST_KEY: &str = "ollama_default_host";
/// Settings key for [`OllamaConfig::default_model`].
pub const MODEL_KEY: &str = "ollama_default_model";
/// Settings key for [`OllamaConfig::available_models`], stored comma-joined.
pub const MODELS_KEY: &str = "ollama_available_models";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub default_host: String,
    pub default_model: String,
    pub available_models: Vec<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::load_defaults()
    }
}

impl OllamaConfig {
    pub fn load_defaults() -> Self {
        Self {
            default_host: DEFAULT_HOST.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            available_models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Overwrite each field whose key exists in `store`. Missing keys keep the current value.
    pub fn refresh(&mut self, store: &dyn SettingsStore) {
        if let Some(host) = store.get(HOST_KEY) {
            debug!(host = %host, "default host from settings");
            self.default_host = host;
        }
        if let Some(model) = store.get(MODEL_KEY) {
            debug!(model = %model, "default model from settings");
            self.default_model = model;
        }
        if let Some(models) = store.get(MODELS_KEY) {
            self.available_models = parse_model_list(&models);
            debug!(count = self.available_models.len(), "model list from settings");
        }
    }

    /// The model list in its stored, comma-joined form.
    pub fn models_setting(&self) -> String {
        self.available_models.join(",")
    }
}

/// Split a comma-separated model list into trimmed, non-empty entries, order kept.
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}
