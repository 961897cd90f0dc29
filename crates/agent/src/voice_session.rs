//! Voice session controller
//!
//! Drives one tutoring session through its four states.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Capture   │────▶│  Dispatch   │────▶│   Parse &   │────▶│  Synthesis  │
//! │ (Listening) │     │ (Thinking)  │     │   update    │     │ (Speaking)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!       ▲                                                            │
//!       │                                                            │
//!       └──────────────────── hands-free resume ◀────────────────────┘
//! ```
//!
//! Capture, dispatch and playback each run as a spawned task. Every task
//! carries the epoch it was spawned under; any later user action bumps the
//! epoch, so a completion that arrives afterwards is dropped on the floor.

use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use voice_tutor_config::SessionSettings;
use voice_tutor_core::{
    parse_reply, AudioPlayer, CaptureError, CaptureEvent, Correction, DisplayTurn,
    InferenceClient, InteractionMode, LearnerProfile, Message, ProgressStore, SpeechCapture,
    TargetLanguage, TextToSpeech, TranscriptStore, TranscriptTurn,
};
use voice_tutor_llm::build_prompt;

use crate::context::SessionContext;
use crate::persist::DebouncedSaver;
use crate::AgentError;

/// Display-only notice appended when a dispatch fails
pub const CONNECTION_ERROR_TEXT: &str = "Connection error. Please try again.";

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Voice session configuration
#[derive(Debug, Clone)]
pub struct VoiceSessionConfig {
    pub language: TargetLanguage,
    /// Quiet period before a profile change is persisted
    pub persist_debounce: Duration,
    /// Consecutive capture runs without a result before listening gives up
    pub max_capture_restarts: u32,
    /// Start with spoken replies disabled
    pub muted: bool,
    /// Enter hands-free mode once microphone access is granted
    pub hands_free_on_grant: bool,
}

impl Default for VoiceSessionConfig {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

impl VoiceSessionConfig {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            language: settings.language(),
            persist_debounce: settings.persist_debounce(),
            max_capture_restarts: settings.max_capture_restarts,
            muted: settings.muted,
            hands_free_on_grant: settings.hands_free_on_grant,
        }
    }

    pub fn with_language(mut self, language: TargetLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }
}

/// External services the session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub inference: Arc<dyn InferenceClient>,
    pub capture: Arc<dyn SpeechCapture>,
    pub tts: Arc<dyn TextToSpeech>,
    pub player: Arc<dyn AudioPlayer>,
    pub store: Arc<dyn ProgressStore>,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceSessionState {
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl VoiceSessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        }
    }
}

impl fmt::Display for VoiceSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the session
#[derive(Debug, Clone)]
pub enum VoiceSessionEvent {
    /// Session started; the greeting is the first transcript entry
    Started { session_id: String, greeting: String },
    StateChanged {
        old: VoiceSessionState,
        new: VoiceSessionState,
    },
    /// Captured text so far, including the current interim hypothesis
    InterimTranscript { text: String },
    /// One final capture segment
    FinalTranscript { text: String },
    /// Learner utterance sent to the tutor
    LearnerTurn { text: String },
    /// Tutor reply with annotations stripped
    Reply {
        text: String,
        corrections: Vec<Correction>,
    },
    LevelUp { from: u8, to: u8, label: String },
    ProfileUpdated(LearnerProfile),
    ModeChanged(InteractionMode),
    /// Microphone access refused; a blocking warning should be shown
    PermissionDenied,
    /// Display-only message appended to the transcript
    Notice { text: String },
    Error(String),
    Ended { reason: String },
}

/// How a capture run ended without being stopped by the user
enum CaptureEnd {
    PermissionDenied,
    Failed(String),
    Exhausted,
}

struct Inner {
    session_id: String,
    config: VoiceSessionConfig,
    collaborators: Collaborators,
    ctx: Mutex<SessionContext>,
    events: broadcast::Sender<VoiceSessionEvent>,
    saver: DebouncedSaver,
}

/// One tutoring session
pub struct VoiceSession {
    inner: Arc<Inner>,
}

impl VoiceSession {
    pub fn new(config: VoiceSessionConfig, collaborators: Collaborators) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let saver = DebouncedSaver::new(collaborators.store.clone(), config.persist_debounce);
        let ctx = Mutex::new(SessionContext::new(config.muted));

        Self {
            inner: Arc::new(Inner {
                session_id: uuid::Uuid::new_v4().to_string(),
                config,
                collaborators,
                ctx,
                events,
                saver,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceSessionEvent> {
        self.inner.events.subscribe()
    }

    /// Load saved progress and greet the learner
    ///
    /// A store failure is logged and the session starts from the initial
    /// profile. Progress is then never saved, so the unreadable record is
    /// left as it was.
    pub async fn start(&self) -> Result<(), AgentError> {
        {
            let ctx = self.inner.ctx.lock();
            if ctx.ended {
                return Err(AgentError::SessionEnded);
            }
            if ctx.started {
                return Err(AgentError::AlreadyStarted);
            }
        }

        let store = &self.inner.collaborators.store;
        let (profile, unreadable) = match store.load().await {
            Ok(Some(profile)) => (profile.normalized(), false),
            Ok(None) => (LearnerProfile::initial(), false),
            Err(e) => {
                tracing::warn!(
                    store = store.name(),
                    error = %e,
                    "Failed to load progress; starting fresh without saving"
                );
                (LearnerProfile::initial(), true)
            },
        };

        let language = self.inner.config.language;
        let greeting = {
            let mut ctx = self.inner.ctx.lock();
            if ctx.started {
                return Err(AgentError::AlreadyStarted);
            }
            ctx.started = true;
            ctx.progress_unreadable = unreadable;
            ctx.mode = profile.mode();
            ctx.transcript = TranscriptStore::new_session(&profile, language);
            let greeting = ctx
                .transcript
                .last_display()
                .map(|turn| turn.content.clone())
                .unwrap_or_default();
            ctx.profile = profile;
            greeting
        };

        tracing::info!(
            session_id = %self.inner.session_id,
            language = language.code(),
            "Tutoring session started"
        );
        self.inner.emit(VoiceSessionEvent::Started {
            session_id: self.inner.session_id.clone(),
            greeting,
        });
        Ok(())
    }

    /// Begin capturing speech
    ///
    /// Interrupts playback when the tutor is speaking. Requests microphone
    /// access first if it has not been granted yet. Ignored while thinking.
    pub async fn start_listening(&self) -> Result<(), AgentError> {
        let inner = &self.inner;
        let (interrupted, needs_permission) = {
            let mut ctx = inner.ctx.lock();
            ensure_active(&ctx)?;
            match ctx.state {
                VoiceSessionState::Listening => return Ok(()),
                VoiceSessionState::Thinking => {
                    tracing::debug!("Listen request ignored while thinking");
                    return Ok(());
                },
                VoiceSessionState::Speaking => {
                    ctx.next_epoch();
                    ctx.tasks.abort_playback();
                    (true, !ctx.permission_granted)
                },
                VoiceSessionState::Idle => (false, !ctx.permission_granted),
            }
        };

        if interrupted {
            tracing::debug!("Playback interrupted by learner");
            inner.collaborators.player.stop().await;
        }

        if needs_permission {
            match inner.collaborators.capture.request_permission().await {
                Ok(()) => {
                    let mut ctx = inner.ctx.lock();
                    ctx.permission_granted = true;
                    ctx.mic_blocked = false;
                    if inner.config.hands_free_on_grant {
                        ctx.hands_free = true;
                    }
                },
                Err(CaptureError::PermissionDenied) => {
                    tracing::warn!("Microphone permission denied");
                    let mut ctx = inner.ctx.lock();
                    ctx.permission_granted = false;
                    ctx.mic_blocked = true;
                    inner.set_state(&mut ctx, VoiceSessionState::Idle);
                    drop(ctx);
                    inner.emit(VoiceSessionEvent::PermissionDenied);
                    return Ok(());
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Microphone permission request failed");
                    let mut ctx = inner.ctx.lock();
                    inner.set_state(&mut ctx, VoiceSessionState::Idle);
                    drop(ctx);
                    inner.emit(VoiceSessionEvent::Error(e.to_string()));
                    return Ok(());
                },
            }
        }

        let mut ctx = inner.ctx.lock();
        if ctx.ended || matches!(ctx.state, VoiceSessionState::Listening | VoiceSessionState::Thinking) {
            return Ok(());
        }
        inner.begin_listening(&mut ctx);
        Ok(())
    }

    /// Stop capturing and send what was heard
    ///
    /// With nothing captured the session simply returns to idle.
    pub async fn stop_listening(&self) -> Result<(), AgentError> {
        let inner = &self.inner;
        let (epoch, text) = {
            let mut ctx = inner.ctx.lock();
            ensure_active(&ctx)?;
            if ctx.state != VoiceSessionState::Listening {
                return Ok(());
            }
            let epoch = ctx.next_epoch();
            ctx.tasks.abort_capture();
            let text = ctx.captured_text();
            ctx.clear_capture();
            if text.trim().is_empty() {
                inner.set_state(&mut ctx, VoiceSessionState::Idle);
            }
            (epoch, text)
        };

        inner.collaborators.capture.stop().await;

        if text.trim().is_empty() {
            tracing::debug!("Listening stopped with nothing captured");
            return Ok(());
        }

        let mut ctx = inner.ctx.lock();
        if !ctx.is_current(epoch) {
            tracing::debug!("Captured text superseded before dispatch");
            return Ok(());
        }
        inner.dispatch(&mut ctx, text);
        Ok(())
    }

    /// Send a typed utterance
    ///
    /// Empty input and input while thinking are ignored. Listening is
    /// abandoned and playback interrupted before the text is sent.
    pub async fn submit_text(&self, text: &str) -> Result<(), AgentError> {
        let inner = &self.inner;
        let text = text.trim();
        let (epoch, stop_capture, stop_player) = {
            let mut ctx = inner.ctx.lock();
            ensure_active(&ctx)?;
            if text.is_empty() {
                return Ok(());
            }
            match ctx.state {
                VoiceSessionState::Thinking => {
                    tracing::debug!("Typed input ignored while thinking");
                    return Ok(());
                },
                VoiceSessionState::Idle => {
                    inner.dispatch(&mut ctx, text.to_string());
                    return Ok(());
                },
                VoiceSessionState::Listening => {
                    let epoch = ctx.next_epoch();
                    ctx.tasks.abort_capture();
                    ctx.clear_capture();
                    (epoch, true, false)
                },
                VoiceSessionState::Speaking => {
                    let epoch = ctx.next_epoch();
                    ctx.tasks.abort_playback();
                    (epoch, false, true)
                },
            }
        };

        if stop_capture {
            inner.collaborators.capture.stop().await;
        }
        if stop_player {
            inner.collaborators.player.stop().await;
        }

        let mut ctx = inner.ctx.lock();
        if !ctx.is_current(epoch) {
            tracing::debug!("Typed input superseded before dispatch");
            return Ok(());
        }
        inner.dispatch(&mut ctx, text.to_string());
        Ok(())
    }

    /// Switch interaction mode; applies from the next learner turn
    pub fn set_mode(&self, mode: InteractionMode) {
        let changed = {
            let mut ctx = self.inner.ctx.lock();
            let changed = ctx.mode != mode;
            ctx.mode = mode;
            changed
        };
        if changed {
            tracing::info!(mode = %mode, "Interaction mode changed");
            self.inner.emit(VoiceSessionEvent::ModeChanged(mode));
        }
    }

    /// Toggle spoken replies
    ///
    /// Muting while speaking stops playback and finishes the turn as if it
    /// had played to the end.
    pub async fn set_muted(&self, muted: bool) {
        let inner = &self.inner;
        let interrupted = {
            let mut ctx = inner.ctx.lock();
            ctx.muted = muted;
            if muted && !ctx.ended && ctx.state == VoiceSessionState::Speaking {
                let epoch = ctx.next_epoch();
                ctx.tasks.abort_playback();
                Some(epoch)
            } else {
                None
            }
        };

        if let Some(epoch) = interrupted {
            inner.collaborators.player.stop().await;
            let mut ctx = inner.ctx.lock();
            if ctx.is_current(epoch) && ctx.state == VoiceSessionState::Speaking {
                inner.finish_speaking(&mut ctx);
            }
        }
    }

    /// Clear the microphone warning; listening can be requested again
    pub fn dismiss_permission_warning(&self) {
        self.inner.ctx.lock().mic_blocked = false;
    }

    /// Tear the session down
    ///
    /// In-flight work is cancelled and a pending progress save is discarded.
    pub async fn end(&self, reason: &str) {
        let inner = &self.inner;
        let previous = {
            let mut ctx = inner.ctx.lock();
            if ctx.ended {
                return;
            }
            ctx.ended = true;
            ctx.next_epoch();
            ctx.tasks.abort_all();
            let previous = ctx.state;
            inner.set_state(&mut ctx, VoiceSessionState::Idle);
            ctx.clear_capture();
            previous
        };

        if inner.saver.cancel() {
            tracing::debug!("Pending progress save discarded");
        }
        match previous {
            VoiceSessionState::Listening => inner.collaborators.capture.stop().await,
            VoiceSessionState::Speaking => inner.collaborators.player.stop().await,
            _ => {},
        }

        tracing::info!(session_id = %inner.session_id, reason, "Tutoring session ended");
        inner.emit(VoiceSessionEvent::Ended {
            reason: reason.to_string(),
        });
    }

    pub fn state(&self) -> VoiceSessionState {
        self.inner.ctx.lock().state
    }

    pub fn profile(&self) -> LearnerProfile {
        self.inner.ctx.lock().profile.clone()
    }

    pub fn mode(&self) -> InteractionMode {
        self.inner.ctx.lock().mode
    }

    pub fn language(&self) -> TargetLanguage {
        self.inner.config.language
    }

    pub fn is_muted(&self) -> bool {
        self.inner.ctx.lock().muted
    }

    pub fn is_hands_free(&self) -> bool {
        self.inner.ctx.lock().hands_free
    }

    pub fn is_permission_blocked(&self) -> bool {
        self.inner.ctx.lock().mic_blocked
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ctx.lock().ended
    }

    /// Whether the profile may be written back to the progress store
    ///
    /// False when the stored progress failed to load.
    pub fn persists_progress(&self) -> bool {
        !self.inner.ctx.lock().progress_unreadable
    }

    /// Transcript as shown to the learner
    pub fn transcript(&self) -> Vec<DisplayTurn> {
        self.inner.ctx.lock().transcript.display().to_vec()
    }

    /// Conversation history as sent to the tutor
    pub fn api_history(&self) -> Vec<Message> {
        self.inner.ctx.lock().transcript.snapshot()
    }

    /// Speech captured so far in the current listening run
    pub fn pending_transcript(&self) -> String {
        self.inner.ctx.lock().pending_text()
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        let mut ctx = self.inner.ctx.lock();
        ctx.ended = true;
        ctx.tasks.abort_all();
        drop(ctx);
        self.inner.saver.cancel();
    }
}

fn ensure_active(ctx: &SessionContext) -> Result<(), AgentError> {
    if ctx.ended {
        Err(AgentError::SessionEnded)
    } else if !ctx.started {
        Err(AgentError::NotStarted)
    } else {
        Ok(())
    }
}

impl Inner {
    fn emit(&self, event: VoiceSessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.ctx.lock().is_current(epoch)
    }

    fn set_state(&self, ctx: &mut SessionContext, new: VoiceSessionState) {
        let old = ctx.state;
        ctx.state = new;
        if old != new {
            tracing::debug!(session_id = %self.session_id, %old, %new, "State changed");
            self.emit(VoiceSessionEvent::StateChanged { old, new });
        }
    }

    fn begin_listening(self: &Arc<Self>, ctx: &mut SessionContext) {
        let epoch = ctx.next_epoch();
        ctx.tasks.abort_capture();
        ctx.clear_capture();
        let locale = self.config.language.capture_locale(ctx.profile.level());
        self.set_state(ctx, VoiceSessionState::Listening);

        let inner = self.clone();
        ctx.tasks.capture = Some(tokio::spawn(inner.run_capture(epoch, locale)));
    }

    /// Keep the recognizer running until the learner stops listening
    ///
    /// Engines end runs on their own after silence. A run that produced a
    /// final segment is always restarted; consecutive fruitless runs are
    /// capped by `max_capture_restarts`.
    async fn run_capture(self: Arc<Self>, epoch: u64, locale: &'static str) {
        let capture = self.collaborators.capture.clone();
        let max_restarts = self.config.max_capture_restarts;
        let mut idle_restarts = 0u32;

        loop {
            let produced = match capture.start(locale).await {
                Ok(mut stream) => {
                    if !self.is_current(epoch) {
                        capture.stop().await;
                        return;
                    }
                    tracing::debug!(locale, engine = capture.engine_name(), "Capture started");

                    let mut produced = false;
                    while let Some(event) = stream.next().await {
                        if !self.is_current(epoch) {
                            return;
                        }
                        match event {
                            CaptureEvent::Interim(text) => self.on_interim(epoch, text),
                            CaptureEvent::Final(text) => produced |= self.on_final(epoch, text),
                            CaptureEvent::Error(CaptureError::Transient(reason)) => {
                                tracing::debug!(%reason, "Transient capture error ignored");
                            },
                            CaptureEvent::Error(CaptureError::PermissionDenied) => {
                                capture.stop().await;
                                self.on_capture_ended(epoch, CaptureEnd::PermissionDenied);
                                return;
                            },
                            CaptureEvent::Error(CaptureError::Fatal(reason)) => {
                                capture.stop().await;
                                self.on_capture_ended(epoch, CaptureEnd::Failed(reason));
                                return;
                            },
                        }
                    }
                    produced
                },
                Err(CaptureError::PermissionDenied) => {
                    self.on_capture_ended(epoch, CaptureEnd::PermissionDenied);
                    return;
                },
                Err(CaptureError::Fatal(reason)) => {
                    self.on_capture_ended(epoch, CaptureEnd::Failed(reason));
                    return;
                },
                Err(CaptureError::Transient(reason)) => {
                    tracing::debug!(%reason, "Capture failed to start");
                    false
                },
            };

            if !self.is_current(epoch) {
                return;
            }
            if produced {
                idle_restarts = 0;
            } else if idle_restarts >= max_restarts {
                self.on_capture_ended(epoch, CaptureEnd::Exhausted);
                return;
            } else {
                idle_restarts += 1;
            }

            metrics::counter!("tutor_capture_restarts_total").increment(1);
            tracing::debug!(idle_restarts, "Capture run ended; restarting");
        }
    }

    fn on_interim(&self, epoch: u64, text: String) {
        let mut ctx = self.ctx.lock();
        if !ctx.is_current(epoch) || ctx.state != VoiceSessionState::Listening {
            return;
        }
        ctx.interim = text;
        let pending = ctx.pending_text();
        drop(ctx);
        self.emit(VoiceSessionEvent::InterimTranscript { text: pending });
    }

    /// Returns true if the segment was kept
    fn on_final(&self, epoch: u64, text: String) -> bool {
        let segment = text.trim();
        let mut ctx = self.ctx.lock();
        if segment.is_empty()
            || !ctx.is_current(epoch)
            || ctx.state != VoiceSessionState::Listening
        {
            return false;
        }
        ctx.segments.push(segment.to_string());
        ctx.interim.clear();
        drop(ctx);
        self.emit(VoiceSessionEvent::FinalTranscript {
            text: segment.to_string(),
        });
        true
    }

    fn on_capture_ended(self: &Arc<Self>, epoch: u64, end: CaptureEnd) {
        let mut ctx = self.ctx.lock();
        if !ctx.is_current(epoch) {
            return;
        }
        ctx.tasks.capture = None;

        // Speech heard before the silence is still sent
        if matches!(end, CaptureEnd::Exhausted) {
            let text = ctx.captured_text();
            if !text.is_empty() {
                tracing::info!(
                    max_restarts = self.config.max_capture_restarts,
                    "Capture went quiet; sending what was heard"
                );
                self.dispatch(&mut ctx, text);
                return;
            }
        }
        ctx.clear_capture();

        let event = match end {
            CaptureEnd::PermissionDenied => {
                tracing::warn!("Microphone permission revoked during capture");
                ctx.permission_granted = false;
                ctx.mic_blocked = true;
                VoiceSessionEvent::PermissionDenied
            },
            CaptureEnd::Failed(reason) => {
                tracing::warn!(%reason, "Speech capture failed");
                VoiceSessionEvent::Error(reason)
            },
            CaptureEnd::Exhausted => {
                tracing::warn!(
                    max_restarts = self.config.max_capture_restarts,
                    "Capture heard nothing after repeated restarts; giving up"
                );
                VoiceSessionEvent::Notice {
                    text: "Stopped listening after a long silence.".to_string(),
                }
            },
        };
        self.set_state(&mut ctx, VoiceSessionState::Idle);
        drop(ctx);
        self.emit(event);
    }

    fn dispatch(self: &Arc<Self>, ctx: &mut SessionContext, text: String) {
        let epoch = ctx.next_epoch();
        ctx.tasks.abort_capture();
        ctx.tasks.abort_playback();
        ctx.tasks.abort_dispatch();
        ctx.clear_capture();

        let mode = ctx.mode;
        ctx.transcript.append(TranscriptTurn::learner(text.clone(), mode));
        let system = build_prompt(&ctx.profile, self.config.language, mode);
        let messages = ctx.transcript.snapshot();
        self.set_state(ctx, VoiceSessionState::Thinking);

        tracing::info!(
            session_id = %self.session_id,
            mode = %mode,
            history = messages.len(),
            "Dispatching learner turn"
        );
        self.emit(VoiceSessionEvent::LearnerTurn { text });

        let inner = self.clone();
        ctx.tasks.dispatch = Some(tokio::spawn(async move {
            metrics::counter!("tutor_dispatch_total").increment(1);
            let started = Instant::now();
            let result = inner
                .collaborators
                .inference
                .complete(&system, &messages)
                .await;
            metrics::histogram!("tutor_dispatch_latency_ms")
                .record(started.elapsed().as_secs_f64() * 1000.0);
            inner.on_dispatch_complete(epoch, result);
        }));
    }

    fn on_dispatch_complete(
        self: &Arc<Self>,
        epoch: u64,
        result: voice_tutor_core::Result<Vec<String>>,
    ) {
        let mut ctx = self.ctx.lock();
        if !ctx.is_current(epoch) {
            tracing::debug!("Stale reply discarded");
            return;
        }
        ctx.tasks.dispatch = None;

        match result {
            Ok(blocks) => self.apply_reply(&mut ctx, blocks.concat()),
            Err(e) => {
                metrics::counter!("tutor_dispatch_failures_total").increment(1);
                tracing::warn!(error = %e, "Tutor request failed");
                ctx.transcript.push_notice(CONNECTION_ERROR_TEXT);
                self.set_state(&mut ctx, VoiceSessionState::Idle);
                drop(ctx);
                self.emit(VoiceSessionEvent::Error(e.to_string()));
                self.emit(VoiceSessionEvent::Notice {
                    text: CONNECTION_ERROR_TEXT.to_string(),
                });
            },
        }
    }

    fn apply_reply(self: &Arc<Self>, ctx: &mut SessionContext, raw: String) {
        let raw = if raw.trim().is_empty() {
            format!("{}, something went wrong!", self.config.language.sorry())
        } else {
            raw
        };

        let parsed = parse_reply(&raw, &ctx.profile);
        let previous_level = ctx.profile.level();
        let mut profile = parsed.profile;
        profile.set_mode(ctx.mode);
        if !ctx.session_recorded {
            profile.record_session();
            ctx.session_recorded = true;
        }

        ctx.transcript.append(TranscriptTurn::assistant(
            parsed.spoken_text.clone(),
            raw,
            parsed.corrections.clone(),
        ));
        ctx.profile = profile.clone();
        if ctx.progress_unreadable {
            tracing::debug!("Stored progress unreadable; not saving");
        } else {
            self.saver.schedule(profile.clone());
        }

        tracing::info!(
            session_id = %self.session_id,
            corrections = parsed.corrections.len(),
            level = profile.level(),
            confidence = profile.confidence(),
            "Tutor replied"
        );
        self.emit(VoiceSessionEvent::Reply {
            text: parsed.spoken_text.clone(),
            corrections: parsed.corrections,
        });
        if profile.level() > previous_level {
            metrics::counter!("tutor_level_ups_total").increment(1);
            self.emit(VoiceSessionEvent::LevelUp {
                from: previous_level,
                to: profile.level(),
                label: profile.level_label().to_string(),
            });
        }
        self.emit(VoiceSessionEvent::ProfileUpdated(profile));

        self.begin_speaking(ctx, parsed.spoken_text);
    }

    fn begin_speaking(self: &Arc<Self>, ctx: &mut SessionContext, text: String) {
        let epoch = ctx.next_epoch();
        self.set_state(ctx, VoiceSessionState::Speaking);

        if ctx.muted || text.trim().is_empty() {
            self.finish_speaking(ctx);
            return;
        }

        let inner = self.clone();
        ctx.tasks.playback = Some(tokio::spawn(async move {
            let result = match inner.collaborators.tts.synthesize(&text).await {
                Ok(clip) => inner.collaborators.player.play(clip).await,
                Err(e) => Err(e),
            };
            inner.on_playback_complete(epoch, result);
        }));
    }

    fn on_playback_complete(self: &Arc<Self>, epoch: u64, result: voice_tutor_core::Result<()>) {
        let mut ctx = self.ctx.lock();
        if !ctx.is_current(epoch) {
            return;
        }
        ctx.tasks.playback = None;

        match result {
            Ok(()) => self.finish_speaking(&mut ctx),
            Err(e) => {
                metrics::counter!("tutor_playback_failures_total").increment(1);
                tracing::warn!(error = %e, "Reply playback failed");
                self.set_state(&mut ctx, VoiceSessionState::Idle);
                drop(ctx);
                self.emit(VoiceSessionEvent::Error(e.to_string()));
            },
        }
    }

    fn finish_speaking(self: &Arc<Self>, ctx: &mut SessionContext) {
        if ctx.resumes_listening() {
            self.begin_listening(ctx);
        } else {
            self.set_state(ctx, VoiceSessionState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(VoiceSessionState::Thinking.to_string(), "thinking");
        assert_eq!(
            serde_json::to_string(&VoiceSessionState::Speaking).unwrap(),
            "\"speaking\""
        );
    }

    #[test]
    fn test_config_from_settings() {
        let settings = SessionSettings {
            target_language: "fr".to_string(),
            muted: true,
            ..Default::default()
        };
        let config = VoiceSessionConfig::from_settings(&settings);
        assert_eq!(config.language, TargetLanguage::French);
        assert!(config.muted);
        assert_eq!(config.persist_debounce, Duration::from_millis(3000));
    }

    #[test]
    fn test_ensure_active() {
        let mut ctx = SessionContext::new(false);
        assert!(matches!(ensure_active(&ctx), Err(AgentError::NotStarted)));
        ctx.started = true;
        assert!(ensure_active(&ctx).is_ok());
        ctx.ended = true;
        assert!(matches!(ensure_active(&ctx), Err(AgentError::SessionEnded)));
    }
}
