//! Voice tutoring session controller
//!
//! Features:
//! - Idle / Listening / Thinking / Speaking session state machine
//! - Continuous speech capture with supervised restarts
//! - Reply parsing, learner profile updates and transcript bookkeeping
//! - Hands-free listening after each spoken reply
//! - Debounced progress persistence

mod context;
pub mod persist;
pub mod voice_session;

pub use persist::DebouncedSaver;
pub use voice_session::{
    Collaborators, VoiceSession, VoiceSessionConfig, VoiceSessionEvent, VoiceSessionState,
    CONNECTION_ERROR_TEXT,
};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Session has not been started")]
    NotStarted,

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session has ended")]
    SessionEnded,

    #[error(transparent)]
    Core(#[from] voice_tutor_core::Error),
}
