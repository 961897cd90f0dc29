//! ElevenLabs text-to-speech

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use voice_tutor_config::TtsSettings;
use voice_tutor_core::{AudioClip, TextToSpeech};

use crate::SpeechError;

/// Configuration for the ElevenLabs client
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    /// Longest text accepted for one request
    pub max_chars: usize,
    pub timeout: Duration,
    pub endpoint: String,
}

impl ElevenLabsConfig {
    /// Build from loaded settings
    pub fn from_settings(settings: &TtsSettings) -> Self {
        Self {
            api_key: settings.resolved_api_key().unwrap_or_default(),
            voice_id: settings.resolved_voice_id().unwrap_or_default(),
            model_id: settings.model_id.clone(),
            stability: settings.stability,
            similarity_boost: settings.similarity_boost,
            style: settings.style,
            use_speaker_boost: settings.use_speaker_boost,
            max_chars: settings.max_chars,
            timeout: settings.timeout(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
        }
    }
}

/// ElevenLabs synthesis client
pub struct ElevenLabsTts {
    config: ElevenLabsConfig,
    client: Client,
}

impl ElevenLabsTts {
    pub fn new(config: ElevenLabsConfig) -> Result<Self, SpeechError> {
        if config.api_key.is_empty() {
            return Err(SpeechError::Configuration(
                "ELEVENLABS_API_KEY not set. Set it via environment or config.".to_string(),
            ));
        }
        if config.voice_id.is_empty() {
            return Err(SpeechError::Configuration(
                "ELEVENLABS_VOICE_ID not set. Set it via environment or config.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn validate_text<'a>(&self, text: &'a str) -> Result<&'a str, SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeechError::InvalidText("text is empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > self.config.max_chars {
            return Err(SpeechError::InvalidText(format!(
                "{} characters exceeds limit of {}",
                chars, self.config.max_chars
            )));
        }
        Ok(text)
    }

    fn build_request<'a>(&'a self, text: &'a str) -> SynthesisRequest<'a> {
        SynthesisRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
                style: self.config.style,
                use_speaker_boost: self.config.use_speaker_boost,
            },
        }
    }

    /// Synthesize text, returning the MPEG bytes
    pub async fn synthesize_mpeg(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let text = self.validate_text(text)?;
        let request = self.build_request(text);

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{}",
                self.config.endpoint, self.config.voice_id
            ))
            .header("xi-api-key", &self.config.api_key)
            .header("accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let bytes = response.bytes().await?;
        tracing::debug!(
            chars = text.chars().count(),
            bytes = bytes.len(),
            "Synthesized reply"
        );
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> voice_tutor_core::Result<AudioClip> {
        let data = self.synthesize_mpeg(text).await?;
        Ok(AudioClip::mpeg(data))
    }

    fn model_name(&self) -> &str {
        &self.config.model_id
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}
