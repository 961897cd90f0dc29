//! Collaborator traits for the voice tutor
//!
//! The session controller talks to the outside world only through these
//! traits, so backends can be swapped by configuration and replaced by fakes
//! in tests.
//!
//! ```text
//! Inference:
//!   - InferenceClient: system instruction + history -> reply text blocks
//!
//! Speech:
//!   - SpeechCapture: microphone permission and streaming recognition
//!   - TextToSpeech: reply text -> audio clip
//!   - AudioPlayer: play one clip at a time, interruptible
//!
//! Persistence:
//!   - ProgressStore: load/save the learner profile
//! ```

mod llm;
mod persistence;
mod speech;

pub use llm::InferenceClient;
pub use persistence::ProgressStore;
pub use speech::{
    AudioClip, AudioPlayer, CaptureError, CaptureEvent, CaptureStream, SpeechCapture, TextToSpeech,
};
