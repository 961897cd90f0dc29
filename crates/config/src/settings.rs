//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use voice_tutor_core::TargetLanguage;

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - missing API keys only warn
    #[default]
    Development,
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Inference service
    #[serde(default)]
    pub llm: LlmSettings,

    /// Speech synthesis
    #[serde(default)]
    pub tts: TtsSettings,

    /// Session behaviour
    #[serde(default)]
    pub session: SessionSettings,

    /// Progress storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Inference service settings (Anthropic Messages API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; the service default applies when unset
    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_anthropic_version")]
    pub api_version: String,

    /// API key; falls back to `ANTHROPIC_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_llm_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_llm_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    1200
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: None,
            timeout_secs: default_llm_timeout(),
            api_version: default_anthropic_version(),
            api_key: None,
        }
    }
}

impl LlmSettings {
    /// Configured key, or the `ANTHROPIC_API_KEY` environment variable
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), "ANTHROPIC_API_KEY")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Speech synthesis settings (ElevenLabs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    /// Disable to run text-only
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,

    /// Voice id; falls back to `ELEVENLABS_VOICE_ID`
    #[serde(default)]
    pub voice_id: Option<String>,

    #[serde(default = "default_tts_model")]
    pub model_id: String,

    #[serde(default = "default_stability")]
    pub stability: f32,

    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,

    #[serde(default = "default_style")]
    pub style: f32,

    #[serde(default = "default_true")]
    pub use_speaker_boost: bool,

    /// Longest text accepted for one synthesis request
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,

    /// API key; falls back to `ELEVENLABS_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Where synthesized clips are written by the file sink
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_tts_endpoint() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_tts_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_stability() -> f32 {
    0.45
}

fn default_similarity_boost() -> f32 {
    0.8
}

fn default_style() -> f32 {
    0.3
}

fn default_max_chars() -> usize {
    2000
}

fn default_tts_timeout() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/audio")
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_tts_endpoint(),
            voice_id: None,
            model_id: default_tts_model(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            style: default_style(),
            use_speaker_boost: true,
            max_chars: default_max_chars(),
            timeout_secs: default_tts_timeout(),
            api_key: None,
            output_dir: default_output_dir(),
        }
    }
}

impl TtsSettings {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), "ELEVENLABS_API_KEY")
    }

    pub fn resolved_voice_id(&self) -> Option<String> {
        resolve_secret(self.voice_id.as_deref(), "ELEVENLABS_VOICE_ID")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Language code of the language being learned
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Quiet period before a changed profile is saved
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,

    /// Consecutive capture restarts without a result before listening gives up
    #[serde(default = "default_max_capture_restarts")]
    pub max_capture_restarts: u32,

    /// Start with speech output muted
    #[serde(default)]
    pub muted: bool,

    /// Enter hands-free mode when microphone access is granted
    #[serde(default = "default_true")]
    pub hands_free_on_grant: bool,
}

fn default_target_language() -> String {
    "de".to_string()
}

fn default_persist_debounce_ms() -> u64 {
    3000
}

fn default_max_capture_restarts() -> u32 {
    5
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            target_language: default_target_language(),
            persist_debounce_ms: default_persist_debounce_ms(),
            max_capture_restarts: default_max_capture_restarts(),
            muted: false,
            hands_free_on_grant: true,
        }
    }
}

impl SessionSettings {
    /// Parsed target language; unknown codes fall back to German
    pub fn language(&self) -> TargetLanguage {
        TargetLanguage::from_code_or_default(&self.target_language)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

/// Progress storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    /// JSON file on local disk
    #[default]
    File,
    /// Remote progress API
    Http,
    /// Process memory only; nothing survives a restart
    Memory,
}

/// Progress storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: PersistenceBackend,

    /// Profile file for the file backend
    #[serde(default = "default_progress_path")]
    pub path: PathBuf,

    /// Base URL of the progress API for the http backend
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token for the progress API; falls back to `VOICE_TUTOR_AUTH_TOKEN`
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_persistence_timeout")]
    pub timeout_secs: u64,
}

fn default_progress_path() -> PathBuf {
    PathBuf::from("data/progress.json")
}

fn default_persistence_timeout() -> u64 {
    10
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            path: default_progress_path(),
            url: None,
            auth_token: None,
            timeout_secs: default_persistence_timeout(),
        }
    }
}

impl PersistenceConfig {
    pub fn resolved_auth_token(&self) -> Option<String> {
        resolve_secret(self.auth_token.as_deref(), "VOICE_TUTOR_AUTH_TOKEN")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn resolve_secret(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok().filter(|s| !s.trim().is_empty()))
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_llm()?;
        self.validate_tts()?;
        self.validate_session()?;
        self.validate_persistence()?;
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if llm.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("llm.endpoint", "Endpoint must not be empty"));
        }
        if llm.model.trim().is_empty() {
            return Err(ConfigError::invalid("llm.model", "Model must not be empty"));
        }
        if llm.max_tokens == 0 {
            return Err(ConfigError::invalid("llm.max_tokens", "Must be greater than 0"));
        }
        if let Some(temperature) = llm.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err(ConfigError::invalid(
                    "llm.temperature",
                    format!("Must be between 0.0 and 1.0, got {}", temperature),
                ));
            }
        }
        if llm.timeout_secs == 0 {
            return Err(ConfigError::invalid("llm.timeout_secs", "Must be greater than 0"));
        }

        if llm.resolved_api_key().is_none() {
            if self.environment.is_strict() {
                return Err(ConfigError::MissingField("llm.api_key".to_string()));
            }
            tracing::warn!("No inference API key configured; requests will be rejected");
        }

        Ok(())
    }

    fn validate_tts(&self) -> Result<(), ConfigError> {
        let tts = &self.tts;
        if !tts.enabled {
            return Ok(());
        }

        if tts.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("tts.endpoint", "Endpoint must not be empty"));
        }
        for (field, value) in [
            ("tts.stability", tts.stability),
            ("tts.similarity_boost", tts.similarity_boost),
            ("tts.style", tts.style),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(
                    field,
                    format!("Must be between 0.0 and 1.0, got {}", value),
                ));
            }
        }
        if tts.max_chars == 0 {
            return Err(ConfigError::invalid("tts.max_chars", "Must be greater than 0"));
        }

        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if TargetLanguage::from_str_loose(&session.target_language).is_none() {
            let supported: Vec<&str> = TargetLanguage::all().iter().map(|l| l.code()).collect();
            return Err(ConfigError::invalid(
                "session.target_language",
                format!(
                    "Unknown language '{}', expected one of {}",
                    session.target_language,
                    supported.join(", ")
                ),
            ));
        }
        if session.persist_debounce_ms == 0 {
            return Err(ConfigError::invalid(
                "session.persist_debounce_ms",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }

    fn validate_persistence(&self) -> Result<(), ConfigError> {
        let persistence = &self.persistence;
        match persistence.backend {
            PersistenceBackend::File => {
                if persistence.path.as_os_str().is_empty() {
                    return Err(ConfigError::invalid(
                        "persistence.path",
                        "File backend requires a path",
                    ));
                }
            },
            PersistenceBackend::Http => {
                let has_url = persistence
                    .url
                    .as_deref()
                    .map(|u| !u.trim().is_empty())
                    .unwrap_or(false);
                if !has_url {
                    return Err(ConfigError::invalid(
                        "persistence.url",
                        "Http backend requires a url",
                    ));
                }
            },
            PersistenceBackend::Memory => {},
        }
        Ok(())
    }
}

/// Load settings from `config/` relative to the working directory
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from a config directory
///
/// Sources, later overriding earlier:
/// 1. `{dir}/default.*`
/// 2. `{dir}/{env}.*`
/// 3. `VOICE_TUTOR_*` environment variables (`VOICE_TUTOR_SESSION__MUTED=true`)
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    builder = builder.add_source(File::from(dir.join("default")).required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("VOICE_TUTOR")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        environment = ?settings.environment,
        language = %settings.session.language(),
        persistence = ?settings.persistence.backend,
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.llm.model, "claude-sonnet-4-20250514");
        assert_eq!(settings.llm.max_tokens, 1200);
        assert_eq!(settings.tts.model_id, "eleven_multilingual_v2");
        assert_eq!(settings.tts.max_chars, 2000);
        assert_eq!(settings.session.persist_debounce_ms, 3000);
        assert_eq!(settings.session.max_capture_restarts, 5);
        assert_eq!(settings.session.language(), TargetLanguage::German);
        assert_eq!(settings.persistence.backend, PersistenceBackend::File);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_temperature_validation() {
        let mut settings = Settings::default();
        settings.llm.temperature = Some(1.5);
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "llm.temperature"
        ));

        settings.llm.temperature = Some(0.4);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_debounce_rejected() {
        let mut settings = Settings::default();
        settings.session.persist_debounce_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_language_rejected() {
        let mut settings = Settings::default();
        settings.session.target_language = "tlh".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("session.target_language"));

        settings.session.target_language = "Italian".to_string();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.session.language(), TargetLanguage::Italian);
    }

    #[test]
    fn test_http_backend_requires_url() {
        let mut settings = Settings::default();
        settings.persistence.backend = PersistenceBackend::Http;
        assert!(settings.validate().is_err());

        settings.persistence.url = Some("https://progress.example.com".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_disabled_tts_skips_validation() {
        let mut settings = Settings::default();
        settings.tts.stability = 3.0;
        assert!(settings.validate().is_err());

        settings.tts.enabled = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_strict_environment_requires_api_key() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.llm.api_key = None;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(field)) if field == "llm.api_key"
        ));

        // Development only warns
        settings.environment = RuntimeEnvironment::Development;
        assert!(settings.validate().is_ok());

        settings.environment = RuntimeEnvironment::Production;
        settings.llm.api_key = Some("sk-test".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_layers_environment_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.yaml"),
            "session:\n  target_language: fr\n  persist_debounce_ms: 1500\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("staging.yaml"),
            "environment: staging\nllm:\n  api_key: sk-staging\nsession:\n  muted: true\n",
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.environment, RuntimeEnvironment::Staging);
        assert_eq!(settings.session.language(), TargetLanguage::French);
        assert_eq!(settings.session.persist_debounce_ms, 1500);
        assert!(settings.session.muted);
        assert_eq!(settings.llm.resolved_api_key().as_deref(), Some("sk-staging"));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.yaml"),
            "session:\n  persist_debounce_ms: 0\n",
        )
        .unwrap();
        assert!(load_settings_from(dir.path(), None).is_err());
    }

    #[test]
    fn test_settings_yaml_round_trip_keeps_defaults() {
        let yaml = serde_yaml::to_string(&Settings::default()).unwrap();
        let parsed: Settings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.session.max_capture_restarts, 5);
        assert_eq!(parsed.tts.stability, 0.45);
    }
}
