//! Integration tests for the tutoring session (capture -> tutor -> speech)
//!
//! The session is driven end to end with deterministic collaborators: a
//! scripted tutor, a recording synthesizer, a player that finishes on demand,
//! the channel-fed capture engine and the in-memory progress store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

use voice_tutor_agent::{
    AgentError, Collaborators, VoiceSession, VoiceSessionConfig, VoiceSessionEvent,
    VoiceSessionState, CONNECTION_ERROR_TEXT,
};
use voice_tutor_core::{
    AudioClip, AudioPlayer, CaptureError, Error, InferenceClient, InteractionMode, LearnerProfile,
    Message, Role, TargetLanguage, TextToSpeech, TurnRole,
};
use voice_tutor_persistence::MemoryProgressStore;
use voice_tutor_speech::{ChannelCapture, ChannelCaptureHandle};

const DEFAULT_REPLY: &str = "Gut gemacht!";

/// Tutor returning scripted replies in order
#[derive(Default)]
struct ScriptedTutor {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<(String, Vec<Message>)>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTutor {
    fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            ..Default::default()
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(message.to_string())])),
            ..Default::default()
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn last_call(&self) -> (String, Vec<Message>) {
        self.calls.lock().last().cloned().unwrap()
    }
}

#[async_trait]
impl InferenceClient for ScriptedTutor {
    async fn complete(&self, system: &str, messages: &[Message]) -> voice_tutor_core::Result<Vec<String>> {
        self.calls
            .lock()
            .push((system.to_string(), messages.to_vec()));

        if let Some(ref gate) = self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let next = self.replies.lock().pop_front();
        match next {
            Some(Ok(reply)) => Ok(vec![reply]),
            Some(Err(message)) => Err(Error::Inference(message)),
            None => Ok(vec![DEFAULT_REPLY.to_string()]),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingTts {
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextToSpeech for RecordingTts {
    async fn synthesize(&self, text: &str) -> voice_tutor_core::Result<AudioClip> {
        self.texts.lock().push(text.to_string());
        Ok(AudioClip::mpeg(vec![0xFF, 0xFB, 0x90]))
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// Player that either finishes immediately or waits for `finish()`
struct TestPlayer {
    auto_finish: bool,
    fail: bool,
    finish: Semaphore,
    plays: Mutex<usize>,
    stops: Mutex<usize>,
}

impl TestPlayer {
    fn auto() -> Self {
        Self::new(true, false)
    }

    fn manual() -> Self {
        Self::new(false, false)
    }

    fn broken() -> Self {
        Self::new(true, true)
    }

    fn new(auto_finish: bool, fail: bool) -> Self {
        Self {
            auto_finish,
            fail,
            finish: Semaphore::new(0),
            plays: Mutex::new(0),
            stops: Mutex::new(0),
        }
    }

    fn finish(&self) {
        self.finish.add_permits(1);
    }

    fn play_count(&self) -> usize {
        *self.plays.lock()
    }

    fn stop_count(&self) -> usize {
        *self.stops.lock()
    }
}

#[async_trait]
impl AudioPlayer for TestPlayer {
    async fn play(&self, _clip: AudioClip) -> voice_tutor_core::Result<()> {
        *self.plays.lock() += 1;
        if self.fail {
            return Err(Error::Playback("audio device unavailable".to_string()));
        }
        if !self.auto_finish {
            self.finish.acquire().await.unwrap().forget();
        }
        Ok(())
    }

    async fn stop(&self) {
        *self.stops.lock() += 1;
    }
}

struct Harness {
    session: VoiceSession,
    tutor: Arc<ScriptedTutor>,
    tts: Arc<RecordingTts>,
    player: Arc<TestPlayer>,
    mic: ChannelCaptureHandle,
    store: Arc<MemoryProgressStore>,
    events: broadcast::Receiver<VoiceSessionEvent>,
}

struct HarnessBuilder {
    config: VoiceSessionConfig,
    tutor: ScriptedTutor,
    player: TestPlayer,
    store: MemoryProgressStore,
    permission: bool,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            config: VoiceSessionConfig::default().with_language(TargetLanguage::German),
            tutor: ScriptedTutor::default(),
            player: TestPlayer::auto(),
            store: MemoryProgressStore::new(),
            permission: true,
        }
    }

    fn tutor(mut self, tutor: ScriptedTutor) -> Self {
        self.tutor = tutor;
        self
    }

    fn player(mut self, player: TestPlayer) -> Self {
        self.player = player;
        self
    }

    fn saved(mut self, profile: LearnerProfile) -> Self {
        self.store = MemoryProgressStore::with_profile(profile);
        self
    }

    fn permission(mut self, granted: bool) -> Self {
        self.permission = granted;
        self
    }

    fn config(mut self, f: impl FnOnce(&mut VoiceSessionConfig)) -> Self {
        f(&mut self.config);
        self
    }

    async fn start(self) -> Harness {
        let tutor = Arc::new(self.tutor);
        let tts = Arc::new(RecordingTts::default());
        let player = Arc::new(self.player);
        let store = Arc::new(self.store);
        let (capture, mic) = ChannelCapture::new(self.permission);

        let session = VoiceSession::new(
            self.config,
            Collaborators {
                inference: tutor.clone(),
                capture: Arc::new(capture),
                tts: tts.clone(),
                player: player.clone(),
                store: store.clone(),
            },
        );
        let events = session.subscribe();
        session.start().await.unwrap();

        Harness {
            session,
            tutor,
            tts,
            player,
            mic,
            store,
            events,
        }
    }
}

impl Harness {
    fn drain_events(&mut self) -> Vec<VoiceSessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    async fn wait_for_state(&self, state: VoiceSessionState) {
        assert!(
            eventually(|| self.session.state() == state).await,
            "expected {}, still {}",
            state,
            self.session.state()
        );
    }

    async fn wait_for_capture(&self, starts: usize) {
        assert!(
            eventually(|| self.mic.start_count() == starts && self.mic.is_capturing()).await,
            "expected capture #{} to be running, {} started",
            starts,
            self.mic.start_count()
        );
    }
}

/// Poll until `check` holds, letting spawned tasks run in between
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    check()
}

fn entered(events: &[VoiceSessionEvent], state: VoiceSessionState) -> bool {
    events
        .iter()
        .any(|e| matches!(e, VoiceSessionEvent::StateChanged { new, .. } if *new == state))
}

#[tokio::test(start_paused = true)]
async fn test_first_session_greeting() {
    let mut h = HarnessBuilder::new().start().await;

    assert_eq!(h.session.state(), VoiceSessionState::Idle);
    let transcript = h.session.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].role, TurnRole::Assistant);
    assert!(transcript[0].content.starts_with("Hallo! I'm Fritz"));
    assert!(transcript[0].content.ends_with("why do you want to learn German?"));
    assert_eq!(h.session.api_history().len(), 1);

    let events = h.drain_events();
    match events.first() {
        Some(VoiceSessionEvent::Started { session_id, greeting }) => {
            assert_eq!(session_id, h.session.session_id());
            assert_eq!(greeting, &transcript[0].content);
        },
        other => panic!("expected Started, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_errors() {
    let (capture, _mic) = ChannelCapture::new(true);
    let session = VoiceSession::new(
        VoiceSessionConfig::default(),
        Collaborators {
            inference: Arc::new(ScriptedTutor::default()),
            capture: Arc::new(capture),
            tts: Arc::new(RecordingTts::default()),
            player: Arc::new(TestPlayer::auto()),
            store: Arc::new(MemoryProgressStore::new()),
        },
    );

    assert!(matches!(session.submit_text("Hallo").await, Err(AgentError::NotStarted)));
    session.start().await.unwrap();
    assert!(matches!(session.start().await, Err(AgentError::AlreadyStarted)));

    session.end("done").await;
    assert!(session.is_ended());
    assert!(matches!(session.submit_text("Hallo").await, Err(AgentError::SessionEnded)));
    assert!(matches!(session.start_listening().await, Err(AgentError::SessionEnded)));
}

#[tokio::test(start_paused = true)]
async fn test_typed_turn_updates_transcript_and_profile() {
    let reply = "Sehr gut! [CORRECTION: \"Ich bin gut\" -> \"Mir geht es gut\" | why: idiomatic expression] \
                 [ASSESS: level=4|confidence=6|new_word=Hallo]";
    let mut h = HarnessBuilder::new()
        .tutor(ScriptedTutor::replying(&[reply]))
        .start()
        .await;

    h.session.submit_text("Ich bin gut").await.unwrap();
    assert_eq!(h.session.state(), VoiceSessionState::Thinking);
    h.wait_for_state(VoiceSessionState::Idle).await;

    let transcript = h.session.transcript();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[1].role, TurnRole::Learner);
    assert_eq!(transcript[1].content, "Ich bin gut");
    assert_eq!(transcript[2].content, "Sehr gut!");
    assert_eq!(transcript[2].corrections.len(), 1);
    assert_eq!(transcript[2].corrections[0].correct, "Mir geht es gut");

    let history = h.session.api_history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].role, Role::User);
    assert_eq!(history[1].content, "[MODE: CONVERSATION]\nIch bin gut");
    assert_eq!(history[2].content, reply);

    let (system, sent) = h.tutor.last_call();
    assert!(system.contains("Current mode: CONVERSATION"));
    assert_eq!(sent.len(), 2);

    let profile = h.session.profile();
    assert_eq!(profile.level(), 3);
    assert_eq!(profile.confidence(), 5);
    assert_eq!(profile.mastered_words(), ["Hallo".to_string()]);
    assert_eq!(profile.sessions(), 1);

    assert_eq!(*h.tts.texts.lock(), vec!["Sehr gut!".to_string()]);
    assert_eq!(h.player.play_count(), 1);

    let events = h.drain_events();
    assert!(entered(&events, VoiceSessionState::Speaking));
    assert!(events
        .iter()
        .any(|e| matches!(e, VoiceSessionEvent::Reply { text, corrections } if text == "Sehr gut!" && corrections.len() == 1)));
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_failure_appends_one_apology() {
    let mut h = HarnessBuilder::new()
        .tutor(ScriptedTutor::failing("connection reset"))
        .start()
        .await;

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;

    let transcript = h.session.transcript();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[2].content, CONNECTION_ERROR_TEXT);
    // The apology never reaches the tutor
    assert_eq!(h.session.api_history().len(), 2);
    assert_eq!(h.session.profile().sessions(), 0);
    assert!(h.tts.texts.lock().is_empty());

    let events = h.drain_events();
    assert!(!entered(&events, VoiceSessionState::Speaking));
    assert!(events.iter().any(|e| matches!(e, VoiceSessionEvent::Error(_))));
    assert_eq!(h.tutor.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_reply_uses_fallback() {
    let h = HarnessBuilder::new()
        .tutor(ScriptedTutor::replying(&["   "]))
        .start()
        .await;

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;

    let transcript = h.session.transcript();
    assert_eq!(
        transcript.last().unwrap().content,
        "Entschuldigung, something went wrong!"
    );
}

#[tokio::test(start_paused = true)]
async fn test_hands_free_voice_loop() {
    let mut h = HarnessBuilder::new().start().await;

    h.session.start_listening().await.unwrap();
    assert_eq!(h.session.state(), VoiceSessionState::Listening);
    assert_eq!(h.mic.permission_requests(), 1);
    assert!(h.session.is_hands_free());
    h.wait_for_capture(1).await;
    assert_eq!(h.mic.started_locales(), vec!["en-US".to_string()]);

    h.mic.interim("Ich");
    h.mic.final_text("Ich bin");
    h.mic.interim("gu");
    assert!(eventually(|| h.session.pending_transcript() == "Ich bin gu").await);
    h.mic.final_text("gut");
    assert!(eventually(|| h.session.pending_transcript() == "Ich bin gut").await);

    h.session.stop_listening().await.unwrap();
    assert_eq!(h.session.state(), VoiceSessionState::Thinking);
    let (_, sent) = h.tutor.last_call();
    assert_eq!(sent.last().unwrap().content, "[MODE: CONVERSATION]\nIch bin gut");

    // Reply plays, then listening resumes on its own
    h.wait_for_capture(2).await;
    assert_eq!(h.session.state(), VoiceSessionState::Listening);
    assert_eq!(h.player.play_count(), 1);
    assert_eq!(h.mic.permission_requests(), 1);

    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, VoiceSessionEvent::FinalTranscript { text } if text == "gut")));
}

#[tokio::test(start_paused = true)]
async fn test_stop_with_nothing_captured_returns_idle() {
    let h = HarnessBuilder::new().start().await;

    h.session.start_listening().await.unwrap();
    h.wait_for_capture(1).await;
    h.mic.interim("äh");
    h.session.stop_listening().await.unwrap();

    assert_eq!(h.session.state(), VoiceSessionState::Idle);
    assert_eq!(h.tutor.call_count(), 0);
    assert_eq!(h.mic.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_blocks_until_dismissed() {
    let mut h = HarnessBuilder::new().permission(false).start().await;

    h.session.start_listening().await.unwrap();
    assert_eq!(h.session.state(), VoiceSessionState::Idle);
    assert!(h.session.is_permission_blocked());
    assert!(!h.session.is_hands_free());
    assert_eq!(h.mic.start_count(), 0);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, VoiceSessionEvent::PermissionDenied)));

    h.session.dismiss_permission_warning();
    assert!(!h.session.is_permission_blocked());

    h.mic.set_permission(true);
    h.session.start_listening().await.unwrap();
    assert_eq!(h.session.state(), VoiceSessionState::Listening);
    assert_eq!(h.mic.permission_requests(), 2);
    h.wait_for_capture(1).await;
}

#[tokio::test(start_paused = true)]
async fn test_permission_revoked_during_capture() {
    let h = HarnessBuilder::new().start().await;

    h.session.start_listening().await.unwrap();
    h.wait_for_capture(1).await;
    h.mic.error(CaptureError::PermissionDenied);

    h.wait_for_state(VoiceSessionState::Idle).await;
    assert!(h.session.is_permission_blocked());
}

#[tokio::test(start_paused = true)]
async fn test_capture_restarts_until_cap() {
    let mut h = HarnessBuilder::new()
        .config(|c| c.max_capture_restarts = 2)
        .start()
        .await;

    h.session.start_listening().await.unwrap();
    for run in 1..=3 {
        h.wait_for_capture(run).await;
        assert_eq!(h.session.state(), VoiceSessionState::Listening);
        h.mic.end_capture();
    }

    h.wait_for_state(VoiceSessionState::Idle).await;
    assert_eq!(h.mic.start_count(), 3);
    assert_eq!(h.tutor.call_count(), 0);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, VoiceSessionEvent::Notice { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_final_segment_resets_restart_budget() {
    let h = HarnessBuilder::new()
        .config(|c| c.max_capture_restarts = 1)
        .start()
        .await;

    h.session.start_listening().await.unwrap();
    h.wait_for_capture(1).await;
    h.mic.final_text("Hallo");
    h.mic.end_capture();

    h.wait_for_capture(2).await;
    assert_eq!(h.session.pending_transcript(), "Hallo");
    h.mic.end_capture();

    h.wait_for_capture(3).await;
    h.mic.end_capture();

    // Silence after speech sends what was heard instead of dropping it
    assert!(eventually(|| h.tutor.call_count() == 1).await);
    let (_, sent) = h.tutor.last_call();
    assert_eq!(sent.last().unwrap().content, "[MODE: CONVERSATION]\nHallo");
    assert_eq!(h.session.pending_transcript(), "");

    // Hands-free resumes after the reply
    h.wait_for_capture(4).await;
    assert_eq!(h.session.state(), VoiceSessionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_transient_capture_error_absorbed() {
    let h = HarnessBuilder::new().start().await;

    h.session.start_listening().await.unwrap();
    h.wait_for_capture(1).await;
    h.mic.error(CaptureError::Transient("network".to_string()));
    h.mic.final_text("Hallo");

    assert!(eventually(|| h.session.pending_transcript() == "Hallo").await);
    assert_eq!(h.session.state(), VoiceSessionState::Listening);
    assert_eq!(h.mic.start_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_capture_error_returns_idle() {
    let mut h = HarnessBuilder::new().start().await;

    h.session.start_listening().await.unwrap();
    h.wait_for_capture(1).await;
    h.mic.error(CaptureError::Fatal("audio device lost".to_string()));

    h.wait_for_state(VoiceSessionState::Idle).await;
    assert!(!h.session.is_permission_blocked());
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, VoiceSessionEvent::Error(reason) if reason == "audio device lost")));
}

#[tokio::test(start_paused = true)]
async fn test_input_ignored_while_thinking() {
    let gate = Arc::new(Semaphore::new(0));
    let h = HarnessBuilder::new()
        .tutor(ScriptedTutor::gated(gate.clone()))
        .start()
        .await;

    h.session.submit_text("Hallo").await.unwrap();
    assert!(eventually(|| h.tutor.call_count() == 1).await);

    h.session.submit_text("Noch etwas").await.unwrap();
    h.session.start_listening().await.unwrap();
    assert_eq!(h.session.state(), VoiceSessionState::Thinking);
    assert_eq!(h.mic.start_count(), 0);

    gate.add_permits(1);
    h.wait_for_state(VoiceSessionState::Idle).await;
    assert_eq!(h.tutor.call_count(), 1);

    let learner_turns: Vec<_> = h
        .session
        .transcript()
        .into_iter()
        .filter(|t| t.role == TurnRole::Learner)
        .map(|t| t.content)
        .collect();
    assert_eq!(learner_turns, vec!["Hallo".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_blank_input_ignored() {
    let h = HarnessBuilder::new().start().await;

    h.session.submit_text("   ").await.unwrap();
    assert_eq!(h.session.state(), VoiceSessionState::Idle);
    assert_eq!(h.tutor.call_count(), 0);
    assert_eq!(h.session.transcript().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_typed_input_interrupts_speaking() {
    let h = HarnessBuilder::new()
        .player(TestPlayer::manual())
        .start()
        .await;

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Speaking).await;
    assert!(eventually(|| h.player.play_count() == 1).await);

    h.session.submit_text("Noch einmal").await.unwrap();
    assert_eq!(h.player.stop_count(), 1);
    assert!(eventually(|| h.player.play_count() == 2).await);
    assert_eq!(h.session.state(), VoiceSessionState::Speaking);
    assert_eq!(h.tutor.call_count(), 2);

    h.player.finish();
    h.wait_for_state(VoiceSessionState::Idle).await;
    // Two full exchanges after the greeting
    assert_eq!(h.session.transcript().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_listening_interrupts_speaking() {
    let h = HarnessBuilder::new()
        .player(TestPlayer::manual())
        .start()
        .await;

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Speaking).await;

    h.session.start_listening().await.unwrap();
    assert_eq!(h.session.state(), VoiceSessionState::Listening);
    assert_eq!(h.player.stop_count(), 1);
    assert!(h.session.is_hands_free());
    h.wait_for_capture(1).await;
}

#[tokio::test(start_paused = true)]
async fn test_muted_session_passes_through_speaking() {
    let mut h = HarnessBuilder::new()
        .config(|c| c.muted = true)
        .start()
        .await;
    assert!(h.session.is_muted());

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;

    assert!(h.tts.texts.lock().is_empty());
    assert_eq!(h.player.play_count(), 0);
    let events = h.drain_events();
    assert!(entered(&events, VoiceSessionState::Speaking));
    assert_eq!(h.session.transcript().last().unwrap().content, DEFAULT_REPLY);
}

#[tokio::test(start_paused = true)]
async fn test_mute_while_speaking_finishes_turn() {
    let h = HarnessBuilder::new()
        .player(TestPlayer::manual())
        .start()
        .await;

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Speaking).await;

    h.session.set_muted(true).await;
    assert_eq!(h.session.state(), VoiceSessionState::Idle);
    assert_eq!(h.player.stop_count(), 1);

    // A late finish from the stopped clip changes nothing
    h.player.finish();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.session.state(), VoiceSessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_playback_failure_returns_idle() {
    let mut h = HarnessBuilder::new()
        .player(TestPlayer::broken())
        .start()
        .await;

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;

    // No learner-visible turn for playback failures
    assert_eq!(h.session.transcript().len(), 3);
    assert_eq!(h.session.transcript()[2].content, DEFAULT_REPLY);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, VoiceSessionEvent::Error(_))));
}

#[tokio::test(start_paused = true)]
async fn test_progress_saved_once_after_quiet_period() {
    let h = HarnessBuilder::new().start().await;

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;
    h.session.submit_text("Wie geht's?").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;
    assert_eq!(h.store.save_count(), 0);

    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(h.store.save_count(), 1);
    let saved = h.store.saved().unwrap();
    assert_eq!(saved.sessions(), 1);
    assert_eq!(saved.mode(), InteractionMode::Conversation);
}

#[tokio::test(start_paused = true)]
async fn test_end_discards_pending_save() {
    let mut h = HarnessBuilder::new().start().await;

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;

    h.session.end("learner left").await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.store.save_count(), 0);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, VoiceSessionEvent::Ended { reason } if reason == "learner left")));
}

#[tokio::test(start_paused = true)]
async fn test_end_while_listening_stops_capture() {
    let h = HarnessBuilder::new().start().await;

    h.session.start_listening().await.unwrap();
    h.wait_for_capture(1).await;
    h.session.end("closed").await;

    assert_eq!(h.session.state(), VoiceSessionState::Idle);
    assert!(!h.mic.is_capturing());
    assert!(!h.mic.final_text("zu spät"));
}

#[tokio::test(start_paused = true)]
async fn test_level_up_event() {
    let mut h = HarnessBuilder::new()
        .saved(LearnerProfile::initial().with_level(3).with_sessions(2))
        .tutor(ScriptedTutor::replying(&["Toll! [ASSESS: level=10]"]))
        .start()
        .await;

    h.session.submit_text("Ich habe gestern einen Roman gelesen.").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;

    let level_up = h.drain_events().into_iter().find_map(|e| match e {
        VoiceSessionEvent::LevelUp { from, to, label } => Some((from, to, label)),
        _ => None,
    });
    assert_eq!(level_up, Some((3, 5, "A2 Pre-Intermediate".to_string())));
    assert_eq!(h.session.profile().level(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_returning_learner_counts_session_once() {
    let h = HarnessBuilder::new()
        .saved(LearnerProfile::initial().with_level(6).with_sessions(4))
        .start()
        .await;

    let greeting = h.session.transcript()[0].content.clone();
    assert!(greeting.starts_with("Willkommen zurück!"));
    assert!(greeting.contains("level 6"));

    h.session.submit_text("Hallo").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;
    assert_eq!(h.session.profile().sessions(), 5);

    h.session.submit_text("Noch einmal").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;
    assert_eq!(h.session.profile().sessions(), 5);

    // Level 6 listens in the target language
    h.session.start_listening().await.unwrap();
    h.wait_for_capture(1).await;
    assert_eq!(h.mic.started_locales(), vec!["de-DE".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_mode_change_applies_to_next_turn() {
    let mut h = HarnessBuilder::new().start().await;

    h.session.set_mode(InteractionMode::Grammar);
    assert_eq!(h.session.mode(), InteractionMode::Grammar);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, VoiceSessionEvent::ModeChanged(InteractionMode::Grammar))));

    h.session.submit_text("Was ist der Dativ?").await.unwrap();
    h.wait_for_state(VoiceSessionState::Idle).await;

    let (system, sent) = h.tutor.last_call();
    assert!(system.contains("Current mode: GRAMMAR"));
    assert_eq!(sent.last().unwrap().content, "[MODE: GRAMMAR]\nWas ist der Dativ?");
    assert_eq!(h.session.profile().mode(), InteractionMode::Grammar);
}

#[tokio::test(start_paused = true)]
async fn test_failed_progress_load_starts_fresh() {
    struct BrokenStore;

    #[async_trait]
    impl voice_tutor_core::ProgressStore for BrokenStore {
        async fn load(&self) -> voice_tutor_core::Result<Option<LearnerProfile>> {
            Err(Error::Persistence("disk unavailable".to_string()))
        }

        async fn save(&self, _profile: &LearnerProfile) -> voice_tutor_core::Result<()> {
            Err(Error::Persistence("disk unavailable".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    let (capture, _mic) = ChannelCapture::new(true);
    let session = VoiceSession::new(
        VoiceSessionConfig::default(),
        Collaborators {
            inference: Arc::new(ScriptedTutor::default()),
            capture: Arc::new(capture),
            tts: Arc::new(RecordingTts::default()),
            player: Arc::new(TestPlayer::auto()),
            store: Arc::new(BrokenStore),
        },
    );

    session.start().await.unwrap();
    assert_eq!(session.profile(), LearnerProfile::initial());
    assert!(session.transcript()[0].content.contains("Fritz"));

    // Failed saves are logged, never surfaced
    session.submit_text("Hallo").await.unwrap();
    assert!(eventually(|| session.state() == VoiceSessionState::Idle).await);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(session.state(), VoiceSessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_progress_never_overwritten() {
    /// Store whose record exists but cannot be read
    struct UnreadableStore {
        inner: MemoryProgressStore,
    }

    #[async_trait]
    impl voice_tutor_core::ProgressStore for UnreadableStore {
        async fn load(&self) -> voice_tutor_core::Result<Option<LearnerProfile>> {
            Err(Error::Persistence("timed out".to_string()))
        }

        async fn save(&self, profile: &LearnerProfile) -> voice_tutor_core::Result<()> {
            voice_tutor_core::ProgressStore::save(&self.inner, profile).await
        }

        fn name(&self) -> &str {
            "unreadable"
        }
    }

    let stored = LearnerProfile::initial().with_level(8).with_sessions(12);
    let store = Arc::new(UnreadableStore {
        inner: MemoryProgressStore::with_profile(stored),
    });

    let (capture, _mic) = ChannelCapture::new(true);
    let session = VoiceSession::new(
        VoiceSessionConfig::default(),
        Collaborators {
            inference: Arc::new(ScriptedTutor::default()),
            capture: Arc::new(capture),
            tts: Arc::new(RecordingTts::default()),
            player: Arc::new(TestPlayer::auto()),
            store: store.clone(),
        },
    );

    session.start().await.unwrap();
    assert!(!session.persists_progress());
    assert_eq!(session.profile().level(), LearnerProfile::initial().level());

    session.submit_text("Hallo").await.unwrap();
    assert!(eventually(|| session.state() == VoiceSessionState::Idle).await);
    assert_eq!(session.profile().sessions(), 1);
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(store.inner.save_count(), 0);
    let kept = store.inner.saved().unwrap();
    assert_eq!(kept.level(), 8);
    assert_eq!(kept.sessions(), 12);
}
