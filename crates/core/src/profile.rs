//! Learner profile model
//!
//! The profile is a small bag of learner attributes that only ever moves in
//! small steps: level and confidence follow a damped moving average of what
//! the tutor reports, and the topic/vocabulary lists keep only the most
//! recent distinct entries.
//!
//! Field names serialize in camelCase so stored progress stays readable by
//! the web client that shares the progress API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_LEVEL: u8 = 10;
pub const MAX_CONFIDENCE: u8 = 10;

pub const DEFAULT_LEVEL: u8 = 3;
pub const DEFAULT_CONFIDENCE: u8 = 5;

pub const STRENGTHS_CAP: usize = 5;
pub const WEAKNESSES_CAP: usize = 5;
pub const MASTERED_WORDS_CAP: usize = 20;
pub const STRUGGLING_WORDS_CAP: usize = 10;

const LEVEL_LABELS: [&str; 11] = [
    "Absolute Beginner",
    "Absolute Beginner",
    "Beginner",
    "A1 Elementary",
    "A1 Elementary",
    "A2 Pre-Intermediate",
    "A2 Pre-Intermediate",
    "B1 Intermediate",
    "B1 Intermediate",
    "B2 Upper-Intermediate",
    "B2+ Advanced",
];

const LEVEL_COLORS: [&str; 11] = [
    "#888", "#888", "#FF6B6B", "#FF8C42", "#FFA500", "#FFD700", "#9ACD32", "#4ECDC4", "#26A69A",
    "#5C85D6", "#9B59B6",
];

/// Display label for a level (levels above the scale use the top label)
pub fn level_label(level: u8) -> &'static str {
    LEVEL_LABELS[level.min(MAX_LEVEL) as usize]
}

/// Badge color for a level
pub fn level_color(level: u8) -> &'static str {
    LEVEL_COLORS[level.min(MAX_LEVEL) as usize]
}

/// Damped level update: `round((3 * old + round(reported)) / 4)`, clamped to the scale.
///
/// Non-finite readings leave the level unchanged.
pub fn damped_level(old: u8, reported: f64) -> u8 {
    if !reported.is_finite() {
        return old.min(MAX_LEVEL);
    }
    let blended = (3.0 * f64::from(old) + reported.round()) / 4.0;
    blended.round().clamp(0.0, f64::from(MAX_LEVEL)) as u8
}

/// Damped confidence update: `round((2 * old + reported) / 3)`, clamped to the scale.
pub fn damped_confidence(old: u8, reported: f64) -> u8 {
    if !reported.is_finite() {
        return old.min(MAX_CONFIDENCE);
    }
    let blended = (2.0 * f64::from(old) + reported) / 3.0;
    blended.round().clamp(0.0, f64::from(MAX_CONFIDENCE)) as u8
}

/// Append `value` to a most-recent-first capped set.
///
/// The value is trimmed; empty values and values already present are
/// ignored. When the list grows past `cap` the oldest entries are evicted.
/// Returns whether the list changed.
fn push_capped(list: &mut Vec<String>, value: &str, cap: usize) -> bool {
    let value = value.trim();
    if value.is_empty() || list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    if list.len() > cap {
        let overflow = list.len() - cap;
        list.drain(..overflow);
    }
    true
}

/// Drop duplicates and keep the `cap` most recent entries
///
/// Lists run oldest to newest, so the last occurrence of a duplicate is kept.
fn normalize_capped(list: &mut Vec<String>, cap: usize) {
    let mut seen: Vec<String> = Vec::with_capacity(list.len());
    for item in list.drain(..).rev() {
        let item = item.trim().to_string();
        if !item.is_empty() && !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen.truncate(cap);
    seen.reverse();
    *list = seen;
}

/// Interaction mode, sent verbatim to the tutor so it can pick a register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionMode {
    /// Free conversation
    #[default]
    #[serde(alias = "CHAT")]
    Conversation,
    /// Vocabulary drills
    #[serde(alias = "FLASHCARD")]
    Vocabulary,
    /// Grammar explanations and exercises
    Grammar,
    /// Situational role play
    #[serde(alias = "SCENARIO")]
    Roleplay,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "CONVERSATION",
            Self::Vocabulary => "VOCABULARY",
            Self::Grammar => "GRAMMAR",
            Self::Roleplay => "ROLEPLAY",
        }
    }

    pub fn all() -> &'static [InteractionMode] {
        &[
            Self::Conversation,
            Self::Vocabulary,
            Self::Grammar,
            Self::Roleplay,
        ]
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conversation" | "chat" | "talk" => Ok(Self::Conversation),
            "vocabulary" | "vocab" | "flashcard" => Ok(Self::Vocabulary),
            "grammar" => Ok(Self::Grammar),
            "roleplay" | "scenario" => Ok(Self::Roleplay),
            other => Err(format!("unknown interaction mode: {}", other)),
        }
    }
}

/// Fields reported by one assessment annotation
///
/// Only fields present in the annotation are `Some`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentFields {
    pub level: Option<f64>,
    pub confidence: Option<f64>,
    pub strength: Option<String>,
    pub weakness: Option<String>,
    pub new_word: Option<String>,
    pub struggling: Option<String>,
}

impl AssessmentFields {
    pub fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.confidence.is_none()
            && self.strength.is_none()
            && self.weakness.is_none()
            && self.new_word.is_none()
            && self.struggling.is_none()
    }
}

/// Learner profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearnerProfile {
    level: u8,
    level_label: String,
    confidence: u8,
    sessions: u32,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    mastered_words: Vec<String>,
    struggling_words: Vec<String>,
    mode: InteractionMode,
}

impl Default for LearnerProfile {
    fn default() -> Self {
        Self::initial()
    }
}

impl LearnerProfile {
    /// Profile for a learner with no saved progress
    pub fn initial() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            level_label: level_label(DEFAULT_LEVEL).to_string(),
            confidence: DEFAULT_CONFIDENCE,
            sessions: 0,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            mastered_words: Vec::new(),
            struggling_words: Vec::new(),
            mode: InteractionMode::default(),
        }
    }

    /// Restore invariants on a profile that came from storage
    pub fn normalized(mut self) -> Self {
        self.level = self.level.min(MAX_LEVEL);
        self.level_label = level_label(self.level).to_string();
        self.confidence = self.confidence.min(MAX_CONFIDENCE);
        normalize_capped(&mut self.strengths, STRENGTHS_CAP);
        normalize_capped(&mut self.weaknesses, WEAKNESSES_CAP);
        normalize_capped(&mut self.mastered_words, MASTERED_WORDS_CAP);
        normalize_capped(&mut self.struggling_words, STRUGGLING_WORDS_CAP);
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.set_level(level);
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence.min(MAX_CONFIDENCE);
        self
    }

    pub fn with_sessions(mut self, sessions: u32) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_mode(mut self, mode: InteractionMode) -> Self {
        self.mode = mode;
        self
    }

    fn set_level(&mut self, level: u8) {
        self.level = level.min(MAX_LEVEL);
        self.level_label = level_label(self.level).to_string();
    }

    pub fn set_mode(&mut self, mode: InteractionMode) {
        self.mode = mode;
    }

    /// Count one more completed session
    pub fn record_session(&mut self) {
        self.sessions = self.sessions.saturating_add(1);
    }

    pub fn push_strength(&mut self, topic: &str) -> bool {
        push_capped(&mut self.strengths, topic, STRENGTHS_CAP)
    }

    pub fn push_weakness(&mut self, topic: &str) -> bool {
        push_capped(&mut self.weaknesses, topic, WEAKNESSES_CAP)
    }

    pub fn push_mastered_word(&mut self, word: &str) -> bool {
        push_capped(&mut self.mastered_words, word, MASTERED_WORDS_CAP)
    }

    pub fn push_struggling_word(&mut self, word: &str) -> bool {
        push_capped(&mut self.struggling_words, word, STRUGGLING_WORDS_CAP)
    }

    /// Apply one assessment, returning the updated profile
    ///
    /// Absent fields leave the corresponding attribute untouched.
    pub fn apply_assessment(&self, fields: &AssessmentFields) -> Self {
        let mut next = self.clone();
        if let Some(reported) = fields.level {
            next.set_level(damped_level(self.level, reported));
        }
        if let Some(reported) = fields.confidence {
            next.confidence = damped_confidence(self.confidence, reported);
        }
        if let Some(ref topic) = fields.strength {
            next.push_strength(topic);
        }
        if let Some(ref topic) = fields.weakness {
            next.push_weakness(topic);
        }
        if let Some(ref word) = fields.new_word {
            next.push_mastered_word(word);
        }
        if let Some(ref word) = fields.struggling {
            next.push_struggling_word(word);
        }
        next
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn level_label(&self) -> &str {
        &self.level_label
    }

    pub fn level_color(&self) -> &'static str {
        level_color(self.level)
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn sessions(&self) -> u32 {
        self.sessions
    }

    pub fn is_first_session(&self) -> bool {
        self.sessions == 0
    }

    pub fn strengths(&self) -> &[String] {
        &self.strengths
    }

    pub fn weaknesses(&self) -> &[String] {
        &self.weaknesses
    }

    pub fn mastered_words(&self) -> &[String] {
        &self.mastered_words
    }

    pub fn struggling_words(&self) -> &[String] {
        &self.struggling_words
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }
}
