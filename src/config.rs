//! Model and API configuration
//!
//! Stored as JSON, e.g.:
//!
//! ```json
//! {
//!   "models": {
//!     "qwen2.5:0.5b": {
//!       "description": "Default physics book writer model",
//!       "system": "You are a Physics book Writer, ...",
//!       "num_ctx": 100000
//!     }
//!   },
//!   "apis": {
//!     "default_api": { "url": "http://localhost:11434", "description": "..." }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.json";
/// Model used when the config names none
pub const DEFAULT_MODEL: &str = "qwen2.5:0.5b";
/// API entry used when the config names none
pub const DEFAULT_API: &str = "default_api";
/// Ollama's usual local address
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Context window requested by default
pub const DEFAULT_NUM_CTX: u32 = 100_000;
/// System instruction sent with every prompt by default
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a Physics book Writer, given a topic you will write a planned book.";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model {0:?} is not configured")]
    UnknownModel(String),
    #[error("api {0:?} is not configured")]
    UnknownApi(String),
}

/// Per-model generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_system")]
    pub system: String,
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
}

/// A model server endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub url: String,
    #[serde(default)]
    pub description: String,
}

/// Configuration file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub apis: BTreeMap<String, ApiConfig>,
}

/// Everything a chat turn needs to build a generate request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatProfile {
    pub model: String,
    pub system: String,
    pub num_ctx: u32,
    pub base_url: String,
}

fn default_system() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_num_ctx() -> u32 {
    DEFAULT_NUM_CTX
}

impl Default for Config {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(
            DEFAULT_MODEL.to_string(),
            ModelConfig {
                description: "Default physics book writer model".to_string(),
                system: default_system(),
                num_ctx: DEFAULT_NUM_CTX,
            },
        );
        let mut apis = BTreeMap::new();
        apis.insert(
            DEFAULT_API.to_string(),
            ApiConfig {
                url: DEFAULT_OLLAMA_URL.to_string(),
                description: "Local API for model generation".to_string(),
            },
        );
        Self { models, apis }
    }
}

impl Config {
    /// Read a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Read a config file, or use the built-in defaults if it does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write the built-in defaults to `path`
    pub fn write_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::default();
        std::fs::write(path, serde_json::to_string_pretty(&config)?)?;
        info!(path = %path.display(), "default config written");
        Ok(config)
    }

    /// Resolve the settings for a model served by an API entry
    ///
    /// `None` picks the default entry, or the only entry when the default
    /// is absent.
    pub fn profile(
        &self,
        model: Option<&str>,
        api: Option<&str>,
    ) -> Result<ChatProfile, ConfigError> {
        let (model_name, model_config) =
            pick(&self.models, model, DEFAULT_MODEL).ok_or_else(|| {
                ConfigError::UnknownModel(model.unwrap_or(DEFAULT_MODEL).to_string())
            })?;
        let (_, api_config) = pick(&self.apis, api, DEFAULT_API)
            .ok_or_else(|| ConfigError::UnknownApi(api.unwrap_or(DEFAULT_API).to_string()))?;

        Ok(ChatProfile {
            model: model_name.clone(),
            system: model_config.system.clone(),
            num_ctx: model_config.num_ctx,
            base_url: api_config.url.clone(),
        })
    }
}

fn pick<'a, T>(
    entries: &'a BTreeMap<String, T>,
    requested: Option<&str>,
    fallback: &str,
) -> Option<(&'a String, &'a T)> {
    match requested {
        Some(name) => entries.get_key_value(name),
        None => entries
            .get_key_value(fallback)
            .or_else(|| if entries.len() == 1 { entries.iter().next() } else { None }),
    }
}
