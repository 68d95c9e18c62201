//! Configuration management for prompt-relay
//!
//! Supports configuration via:
//! 1. Config file (~/.config/prompt-relay/config.toml)
//! 2. Environment variables (PROMPT_RELAY_API_KEY, PROMPT_RELAY_BASE_URL, PROMPT_RELAY_MODEL)
//! 3. CLI arguments (override file/env settings)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const API_KEY_ENV: &str = "PROMPT_RELAY_API_KEY";
pub const BASE_URL_ENV: &str = "PROMPT_RELAY_BASE_URL";
pub const MODEL_ENV: &str = "PROMPT_RELAY_MODEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream chat-completions provider
    pub provider: ProviderSettings,

    /// Streaming relay timeouts and buffering
    pub relay: RelaySettings,

    /// Prompt optimization settings
    pub optimization: OptimizationSettings,

    /// Template catalog
    pub templates: TemplateSettings,

    /// Message persistence
    pub store: StoreSettings,
}

/// Upstream provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// API key (can also use PROMPT_RELAY_API_KEY env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// Model to request
    pub model: String,

    /// Maximum tokens for responses
    pub max_tokens: u32,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System prompt sent ahead of every user message
    pub system_prompt: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: None,
            system_prompt: "You are a helpful assistant.".to_string(),
        }
    }
}

/// Relay timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Connection timeout for the upstream request
    pub connect_timeout_secs: u64,

    /// Longest gap between data lines before a stream counts as stalled
    pub inactivity_timeout_secs: u64,

    /// Upper bound on a whole streamed answer
    pub stream_timeout_secs: u64,

    /// Events buffered for a slow consumer
    pub channel_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            inactivity_timeout_secs: 60,
            stream_timeout_secs: 1800,
            channel_capacity: 64,
        }
    }
}

/// Optimization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationSettings {
    /// Run template selection and compression before relaying
    pub enabled: bool,

    /// Target token budget
    pub token_budget: usize,

    /// Template type used when a request does not name one
    pub default_template_type: String,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            token_budget: 1024,
            default_template_type: crate::templates::DEFAULT_TEMPLATE_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    /// TOML catalog loaded on top of the built-in templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory for persisted messages; defaults under the user data dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_dir: Option<PathBuf>,
}

impl StoreSettings {
    pub fn messages_dir(&self) -> PathBuf {
        self.messages_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("prompt-relay")
                .join("messages")
        })
    }
}

impl Config {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prompt-relay")
            .join("config.toml")
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from specific path
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default().with_env_overrides());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(API_KEY_ENV) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = lookup(BASE_URL_ENV) {
            self.provider.base_url = url;
        }
        if let Some(model) = lookup(MODEL_ENV) {
            self.provider.model = model;
        }
        self
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to specific path
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key().is_none() {
            return Err(ConfigError::MissingRequired(format!(
                "provider.api_key (or {})",
                API_KEY_ENV
            )));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired(format!(
                "provider.base_url (or {})",
                BASE_URL_ENV
            )));
        }
        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired("provider.model".to_string()));
        }
        Ok(())
    }

    /// Non-blank API key, if one is configured
    pub fn api_key(&self) -> Option<String> {
        self.provider
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
    }

    /// Generate example config content
    pub fn example() -> String {
        let mut example = Config::default();
        example.provider.api_key = Some("sk-...".to_string());
        toml::to_string_pretty(&example).unwrap_or_default()
    }
}

/// Builder for creating Config programmatically
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.provider.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.provider.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.provider.model = model.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.provider.system_prompt = prompt.into();
        self
    }

    pub fn token_budget(mut self, tokens: usize) -> Self {
        self.config.optimization.token_budget = tokens;
        self
    }

    pub fn optimization_enabled(mut self, enabled: bool) -> Self {
        self.config.optimization.enabled = enabled;
        self
    }

    pub fn inactivity_timeout_secs(mut self, secs: u64) -> Self {
        self.config.relay.inactivity_timeout_secs = secs;
        self
    }

    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.templates.catalog_path = Some(path.into());
        self
    }

    pub fn messages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.store.messages_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.relay.inactivity_timeout_secs, 60);
        assert_eq!(config.relay.stream_timeout_secs, 1800);
        assert_eq!(config.optimization.default_template_type, "chat");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .api_key("test-key")
            .model("local-model")
            .token_budget(512)
            .messages_dir("/tmp/messages")
            .build();

        assert_eq!(config.api_key(), Some("test-key".to_string()));
        assert_eq!(config.provider.model, "local-model");
        assert_eq!(config.optimization.token_budget, 512);
        assert_eq!(config.store.messages_dir(), PathBuf::from("/tmp/messages"));
        assert_ok!(config.validate());
    }

    #[test]
    fn test_validate_rejects_blank_values() {
        let config = ConfigBuilder::new().api_key("   ").build();
        assert_err!(config.validate());
        assert!(matches!(config.validate(), Err(ConfigError::MissingRequired(_))));

        let config = ConfigBuilder::new().api_key("key").base_url("").build();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::default().with_overrides(|name| match name {
            API_KEY_ENV => Some("from-env".to_string()),
            MODEL_ENV => Some("env-model".to_string()),
            _ => None,
        });
        assert_eq!(config.api_key(), Some("from-env".to_string()));
        assert_eq!(config.provider.model, "env-model");
        assert_eq!(config.provider.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[provider]\nmodel = \"m\"\n\n[relay]\ninactivity_timeout_secs = 5\n",
        )
        .unwrap();

        let config = Config::load_from(path).unwrap();
        assert!(!config.provider.model.is_empty());
        assert_eq!(config.relay.inactivity_timeout_secs, 5);
        assert_eq!(config.relay.channel_capacity, 64);
    }

    #[test]
    fn test_save_and_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        ConfigBuilder::new().api_key("k").build().save_to(path.clone()).unwrap();
        let loaded: Config = toml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded.provider.api_key, Some("k".to_string()));

        let example = Config::example();
        assert!(example.contains("[provider]"));
        assert!(example.contains("[relay]"));
    }
}
