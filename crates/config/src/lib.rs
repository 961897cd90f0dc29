//! Configuration management for the voice tutor
//!
//! Supports loading configuration from:
//! - YAML/TOML/JSON files (`config/default`, then `config/{env}`)
//! - Environment variables (VOICE_TUTOR_ prefix, `__` between sections)
//!
//! Every section has defaults, so an empty configuration is valid.

pub mod settings;

pub use settings::{
    load_settings, load_settings_from, LlmSettings, ObservabilityConfig, PersistenceBackend,
    PersistenceConfig, RuntimeEnvironment, SessionSettings, Settings, TtsSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
