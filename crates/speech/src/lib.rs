//! Speech collaborators for the voice tutor
//!
//! - `ElevenLabsTts`: reply text to MPEG audio over the ElevenLabs API
//! - `FileAudioSink`: an audio player that writes each clip to disk
//! - `ChannelCapture`: a capture engine fed through a handle, used by the
//!   text-mode client and by tests

pub mod capture;
pub mod sink;
pub mod tts;

pub use capture::{ChannelCapture, ChannelCaptureHandle};
pub use sink::FileAudioSink;
pub use tts::{ElevenLabsConfig, ElevenLabsTts};

use thiserror::Error;

/// Speech errors
#[derive(Error, Debug)]
pub enum SpeechError {
    /// Text was empty or longer than the synthesis limit
    #[error("Invalid text: {0}")]
    InvalidText(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        SpeechError::Network(err.to_string())
    }
}

impl From<SpeechError> for voice_tutor_core::Error {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::Io(e) => voice_tutor_core::Error::Playback(e.to_string()),
            other => voice_tutor_core::Error::Synthesis(other.to_string()),
        }
    }
}
