//! Error types shared by all collaborators

use thiserror::Error;

use crate::traits::CaptureError;

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
///
/// Every collaborator crate converts its own error into one of these variants
/// so the session controller can classify failures without knowing which
/// backend produced them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is a microphone permission failure
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::Capture(CaptureError::PermissionDenied))
    }
}
