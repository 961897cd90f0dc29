//! Speech capture, synthesis and playback traits

use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// Failure reported by the capture engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Microphone access was refused by the learner or the platform
    #[error("microphone permission denied")]
    PermissionDenied,

    /// Nothing was heard, or capture was aborted; safe to ignore
    #[error("transient capture error: {0}")]
    Transient(String),

    /// Capture cannot continue
    #[error("capture failed: {0}")]
    Fatal(String),
}

impl CaptureError {
    /// Whether the error should be silently ignored
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Transient(_))
    }
}

/// Event emitted by a running capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Partial hypothesis for the current phrase; superseded by later events
    Interim(String),
    /// Final text for one phrase
    Final(String),
    /// Error from the engine; the stream may end after it
    Error(CaptureError),
}

/// Stream of capture events; ends when the engine stops on its own
pub type CaptureStream = Pin<Box<dyn Stream<Item = CaptureEvent> + Send>>;

/// Streaming speech recognizer
///
/// A capture runs from `start` until `stop` is called or the returned stream
/// ends. Engines commonly stop by themselves after a pause, so callers that
/// want continuous capture restart it when the stream ends.
#[async_trait]
pub trait SpeechCapture: Send + Sync + 'static {
    /// Ask for microphone access
    ///
    /// Returns `CaptureError::PermissionDenied` when refused.
    async fn request_permission(&self) -> std::result::Result<(), CaptureError>;

    /// Begin capturing in the given BCP-47 locale
    async fn start(&self, locale: &str) -> std::result::Result<CaptureStream, CaptureError>;

    /// Stop the running capture, if any
    async fn stop(&self);

    /// Engine name for logging
    fn engine_name(&self) -> &str;
}

/// Synthesized audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    pub data: Vec<u8>,
    /// MIME type, e.g. `audio/mpeg`
    pub mime: String,
}

impl AudioClip {
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
        }
    }

    pub fn mpeg(data: Vec<u8>) -> Self {
        Self::new(data, "audio/mpeg")
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Text-to-Speech interface
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize one reply
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

/// Audio output
///
/// `play` resolves when the clip has finished playing. `stop` halts the
/// current clip; a `play` call that is interrupted this way resolves `Ok`.
#[async_trait]
pub trait AudioPlayer: Send + Sync + 'static {
    async fn play(&self, clip: AudioClip) -> Result<()>;

    async fn stop(&self);
}
