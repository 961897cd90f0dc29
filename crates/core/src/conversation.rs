//! Conversation transcript
//!
//! The transcript is kept in two parallel forms:
//! - display form: what the learner sees and hears (annotations stripped)
//! - API form: what is exchanged with the inference service (annotations
//!   kept, learner turns prefixed with the interaction mode tag)
//!
//! Completed turns are appended to both forms as a pair. Prompt assembly
//! only ever reads the API form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotation::Correction;
use crate::language::TargetLanguage;
use crate::llm_types::Message;
use crate::profile::{InteractionMode, LearnerProfile};

/// Name of the tutor persona
pub const TUTOR_NAME: &str = "Fritz";

/// Prefix of the mode tag added to learner turns in API form
pub const MODE_TAG_PREFIX: &str = "[MODE: ";

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Learner,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::Learner => "learner",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One completed turn in both forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: TurnRole,
    pub display_content: String,
    pub api_content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<Correction>,
}

impl TranscriptTurn {
    /// Learner turn; the API form carries the mode tag
    pub fn learner(text: impl Into<String>, mode: InteractionMode) -> Self {
        let text = text.into();
        Self {
            role: TurnRole::Learner,
            api_content: format!("{}{}]\n{}", MODE_TAG_PREFIX, mode.as_str(), text),
            display_content: text,
            corrections: Vec::new(),
        }
    }

    /// Assistant turn from a parsed reply
    pub fn assistant(
        spoken: impl Into<String>,
        raw: impl Into<String>,
        corrections: Vec<Correction>,
    ) -> Self {
        Self {
            role: TurnRole::Assistant,
            display_content: spoken.into(),
            api_content: raw.into(),
            corrections,
        }
    }
}

/// A turn as shown to the learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayTurn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<Correction>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only transcript for one session
#[derive(Debug, Clone, Default)]
pub struct TranscriptStore {
    display: Vec<DisplayTurn>,
    api: Vec<Message>,
}

impl TranscriptStore {
    /// Empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh transcript for a new session, seeded with the tutor's greeting
    pub fn new_session(profile: &LearnerProfile, language: TargetLanguage) -> Self {
        let intro = introduction(profile, language);
        let mut store = Self::new();
        store.append(TranscriptTurn::assistant(intro.clone(), intro, Vec::new()));
        store
    }

    /// Append a completed turn to both forms
    pub fn append(&mut self, turn: TranscriptTurn) {
        let message = match turn.role {
            TurnRole::Learner => Message::user(turn.api_content),
            TurnRole::Assistant => Message::assistant(turn.api_content),
        };
        self.display.push(DisplayTurn {
            role: turn.role,
            content: turn.display_content,
            corrections: turn.corrections,
            timestamp: Utc::now(),
        });
        self.api.push(message);
    }

    /// Append an assistant notice that is shown but never sent to the model
    ///
    /// Used for failure apologies, which are not part of the dialogue the
    /// tutor should see.
    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.display.push(DisplayTurn {
            role: TurnRole::Assistant,
            content: text.into(),
            corrections: Vec::new(),
            timestamp: Utc::now(),
        });
    }

    /// API-form history for prompt assembly
    pub fn snapshot(&self) -> Vec<Message> {
        self.api.clone()
    }

    pub fn display(&self) -> &[DisplayTurn] {
        &self.display
    }

    pub fn last_display(&self) -> Option<&DisplayTurn> {
        self.display.last()
    }

    pub fn display_len(&self) -> usize {
        self.display.len()
    }

    pub fn api_len(&self) -> usize {
        self.api.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display.is_empty()
    }
}

/// Greeting that opens a session
///
/// First-time learners get an introduction and an open question; returning
/// learners get a recap of where they stand.
pub fn introduction(profile: &LearnerProfile, language: TargetLanguage) -> String {
    if profile.is_first_session() {
        format!(
            "{hello}! I'm {tutor}, your personal {name} tutor. I'm going to pay close attention \
             to how you communicate and adapt to exactly where you are. No pressure at all, just \
             talk to me naturally, even in English, and I'll figure out the best place to start. \
             So tell me, why do you want to learn {name}?",
            hello = language.hello(),
            tutor = TUTOR_NAME,
            name = language.name(),
        )
    } else {
        let vocabulary = if profile.mastered_words().is_empty() {
            "Let's keep building."
        } else {
            "You've been building up some solid vocabulary."
        };
        format!(
            "{welcome}! Great to see you again. You are at level {level}, {label}. {vocabulary} \
             Ready to continue?",
            welcome = language.welcome_back(),
            level = profile.level(),
            label = profile.level_label(),
            vocabulary = vocabulary,
        )
    }
}
