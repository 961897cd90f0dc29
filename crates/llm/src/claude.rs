//! Claude Backend
//!
//! Implements the Anthropic Messages API as the tutor's inference service.
//! The system instruction travels in the top-level `system` field and the
//! API-form transcript is sent as-is.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use voice_tutor_config::LlmSettings;
use voice_tutor_core::{InferenceClient, Message};

use crate::LlmError;

/// Configuration for Claude backend
#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    /// API key (from ANTHROPIC_API_KEY or direct)
    pub api_key: String,
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Temperature (0.0 - 1.0); service default when unset
    pub temperature: Option<f32>,
    /// Request timeout
    pub timeout: Duration,
    /// API endpoint (for testing or proxy)
    pub endpoint: String,
    /// Value of the `anthropic-version` header
    pub api_version: String,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        let settings = LlmSettings::default();
        let timeout = settings.timeout();
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: settings.model,
            max_tokens: settings.max_tokens,
            temperature: None,
            timeout,
            endpoint: settings.endpoint,
            api_version: settings.api_version,
        }
    }
}

impl ClaudeConfig {
    /// Create config with API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Build from loaded settings
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            api_key: settings.resolved_api_key().unwrap_or_default(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: settings.timeout(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_version: settings.api_version.clone(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Anthropic Messages API client
pub struct ClaudeBackend {
    config: ClaudeConfig,
    client: Client,
}

impl ClaudeBackend {
    /// Create a new Claude backend
    pub fn new(config: ClaudeConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "ANTHROPIC_API_KEY not set. Set it via environment or config.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn build_request(&self, system: &str, messages: &[Message]) -> ClaudeRequest {
        ClaudeRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: if system.is_empty() {
                None
            } else {
                Some(system.to_string())
            },
            messages: messages.iter().map(ClaudeMessage::from).collect(),
            temperature: self.config.temperature,
        }
    }

    /// Send one request and return the text blocks of the reply
    pub async fn generate(&self, system: &str, messages: &[Message]) -> Result<Vec<String>, LlmError> {
        let request = self.build_request(system, messages);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.endpoint))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let response: ClaudeApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            model = %self.config.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "Claude reply received"
        );

        Ok(text_blocks(response))
    }
}

#[async_trait]
impl InferenceClient for ClaudeBackend {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
    ) -> voice_tutor_core::Result<Vec<String>> {
        Ok(self.generate(system, messages).await?)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn text_blocks(response: ClaudeApiResponse) -> Vec<String> {
    response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ClaudeContentBlock::Text { text } => Some(text),
            ClaudeContentBlock::Other => None,
        })
        .collect()
}

// =============================================================================
// API types
// =============================================================================

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: String,
}

impl From<&Message> for ClaudeMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            voice_tutor_core::Role::User => "user",
            voice_tutor_core::Role::Assistant => "assistant",
        };
        Self {
            role,
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ClaudeApiResponse {
    content: Vec<ClaudeContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize, Default)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
