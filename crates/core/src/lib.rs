//! Core traits and types for the voice tutor
//!
//! This crate provides foundational types used across all other crates:
//! - Learner profile model (damped level/confidence, capped vocabulary lists)
//! - Reply annotation parser (corrections and assessments hidden in tutor replies)
//! - Conversation transcript in display and API forms
//! - Target language definitions
//! - Collaborator traits (inference, speech capture, synthesis, playback, progress storage)
//! - Error types

pub mod annotation;
pub mod conversation;
pub mod error;
pub mod language;
pub mod llm_types;
pub mod profile;
pub mod traits;

pub use annotation::{parse_reply, Correction, ParsedReply};
pub use conversation::{
    introduction, DisplayTurn, TranscriptStore, TranscriptTurn, TurnRole, MODE_TAG_PREFIX, TUTOR_NAME,
};
pub use error::{Error, Result};
pub use language::TargetLanguage;
pub use llm_types::{Message, Role};
pub use profile::{
    damped_confidence, damped_level, level_color, level_label, AssessmentFields, InteractionMode,
    LearnerProfile,
};

pub use traits::{
    AudioClip, AudioPlayer, CaptureError, CaptureEvent, CaptureStream, InferenceClient,
    ProgressStore, SpeechCapture, TextToSpeech,
};
