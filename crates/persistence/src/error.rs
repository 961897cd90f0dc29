//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored progress is unreadable: {0}")]
    Corrupt(String),

    #[error("Progress API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for PersistenceError {
    fn from(err: reqwest::Error) -> Self {
        PersistenceError::Network(err.to_string())
    }
}

impl From<PersistenceError> for voice_tutor_core::Error {
    fn from(err: PersistenceError) -> Self {
        voice_tutor_core::Error::Persistence(err.to_string())
    }
}
