//! Tutor inference
//!
//! Features:
//! - System prompt assembly from the learner profile
//! - Anthropic Messages API backend

pub mod claude;
pub mod prompt;

pub use claude::{ClaudeBackend, ClaudeConfig};
pub use prompt::build_prompt;

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for voice_tutor_core::Error {
    fn from(err: LlmError) -> Self {
        voice_tutor_core::Error::Inference(err.to_string())
    }
}
