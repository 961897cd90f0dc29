//! Mutable state of one tutoring session
//!
//! Everything the controller mutates lives here, behind a single lock held
//! by the session. Spawned operations capture the epoch current at spawn
//! time; a completion whose epoch no longer matches is stale and ignored.

use tokio::task::JoinHandle;

use voice_tutor_core::{InteractionMode, LearnerProfile, TranscriptStore};

use crate::VoiceSessionState;

/// Handles of the operations currently in flight
#[derive(Default)]
pub(crate) struct TaskSlots {
    pub capture: Option<JoinHandle<()>>,
    pub dispatch: Option<JoinHandle<()>>,
    pub playback: Option<JoinHandle<()>>,
}

impl TaskSlots {
    pub fn abort_capture(&mut self) {
        if let Some(handle) = self.capture.take() {
            handle.abort();
        }
    }

    pub fn abort_dispatch(&mut self) {
        if let Some(handle) = self.dispatch.take() {
            handle.abort();
        }
    }

    pub fn abort_playback(&mut self) {
        if let Some(handle) = self.playback.take() {
            handle.abort();
        }
    }

    pub fn abort_all(&mut self) {
        self.abort_capture();
        self.abort_dispatch();
        self.abort_playback();
    }
}

pub(crate) struct SessionContext {
    pub state: VoiceSessionState,
    pub profile: LearnerProfile,
    pub transcript: TranscriptStore,
    pub mode: InteractionMode,
    /// Sticky once microphone access has been granted
    pub hands_free: bool,
    pub permission_granted: bool,
    /// Blocking warning shown until dismissed
    pub mic_blocked: bool,
    pub muted: bool,
    /// Final capture segments, in order
    pub segments: Vec<String>,
    /// Latest interim hypothesis
    pub interim: String,
    pub epoch: u64,
    /// Whether this session has been counted in `profile.sessions`
    pub session_recorded: bool,
    /// Stored progress could not be read; saving would overwrite it
    pub progress_unreadable: bool,
    pub started: bool,
    pub ended: bool,
    pub tasks: TaskSlots,
}

impl SessionContext {
    pub fn new(muted: bool) -> Self {
        Self {
            state: VoiceSessionState::Idle,
            profile: LearnerProfile::initial(),
            transcript: TranscriptStore::new(),
            mode: InteractionMode::default(),
            hands_free: false,
            permission_granted: false,
            mic_blocked: false,
            muted,
            segments: Vec::new(),
            interim: String::new(),
            epoch: 0,
            session_recorded: false,
            progress_unreadable: false,
            started: false,
            ended: false,
            tasks: TaskSlots::default(),
        }
    }

    /// Start a new operation, invalidating every earlier one
    pub fn next_epoch(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        !self.ended && self.epoch == epoch
    }

    pub fn clear_capture(&mut self) {
        self.segments.clear();
        self.interim.clear();
    }

    /// Captured text so far: final segments in order
    pub fn captured_text(&self) -> String {
        self.segments.join(" ")
    }

    /// Captured text including the current interim hypothesis
    pub fn pending_text(&self) -> String {
        let interim = self.interim.trim();
        match (self.segments.is_empty(), interim.is_empty()) {
            (_, true) => self.captured_text(),
            (true, false) => interim.to_string(),
            (false, false) => format!("{} {}", self.captured_text(), interim),
        }
    }

    /// Whether finishing a reply should resume listening
    pub fn resumes_listening(&self) -> bool {
        self.hands_free && self.permission_granted && !self.mic_blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_text_joins_segments_and_interim() {
        let mut ctx = SessionContext::new(false);
        assert_eq!(ctx.pending_text(), "");

        ctx.interim = "Ich".to_string();
        assert_eq!(ctx.pending_text(), "Ich");

        ctx.segments.push("Ich bin".to_string());
        ctx.interim = "gu".to_string();
        assert_eq!(ctx.pending_text(), "Ich bin gu");

        ctx.segments.push("gut".to_string());
        ctx.interim.clear();
        assert_eq!(ctx.captured_text(), "Ich bin gut");
    }

    #[test]
    fn test_epoch_invalidates_previous_operations() {
        let mut ctx = SessionContext::new(false);
        let first = ctx.next_epoch();
        assert!(ctx.is_current(first));
        let second = ctx.next_epoch();
        assert!(!ctx.is_current(first));
        assert!(ctx.is_current(second));

        ctx.ended = true;
        assert!(!ctx.is_current(second));
    }
}
