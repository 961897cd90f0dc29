//! System prompt assembly
//!
//! The prompt is rebuilt from the current profile for every dispatched turn,
//! so level changes take effect on the very next reply.

use voice_tutor_core::{InteractionMode, LearnerProfile, TargetLanguage, TUTOR_NAME};

/// Mastered words quoted in the prompt
const PROMPT_MASTERED_WORDS: usize = 8;

/// Struggling words quoted in the prompt
const PROMPT_STRUGGLING_WORDS: usize = 5;

/// Build the system instruction for one dispatch
pub fn build_prompt(
    profile: &LearnerProfile,
    language: TargetLanguage,
    mode: InteractionMode,
) -> String {
    let name = language.name();
    let modes = InteractionMode::all()
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are {tutor}, a deeply attentive and emotionally intelligent {name} tutor with real personality.
You are teaching {name} ({native}).

LEARNER PROFILE:
- Detected Level: {level}/10 ({label})
- Confidence: {confidence}/10
- Sessions: {sessions}
- Strong Areas: {strengths}
- Weak Areas: {weaknesses}
- Words Mastered: {mastered}
- Struggling With: {struggling}

ADAPTATION:
- Level 0-2: Mostly English. 1-2 {name} words per reply. Extremely encouraging.
- Level 3-4: Mix English/{name} 50/50. Simple present only. Celebrate wins.
- Level 5-6: Lean toward {name} with English support. Warm corrections.
- Level 7-8: Mostly {name}. Full sentences expected. Point out nuance.
- Level 9-10: Full {name}. Complex topics. Nuanced corrections.

CORRECTION FORMAT (when the learner makes an error):
[CORRECTION: "what they said" -> "correct form" | why: brief reason]
Max 2 corrections per reply. Never shame the learner.

ASSESSMENT (append after EVERY reply, parsed silently):
[ASSESS: level=X | confidence=Y | strength=topic | weakness=topic | new_word=word | struggling=word]

PERSONALITY:
- Warm, witty, genuinely curious about this person's life
- Make cultural references to {name}-speaking countries naturally
- Celebrate wins genuinely, not robotically
- When they struggle, get gentler without being condescending

SPEECH RULES (replies are spoken aloud):
- Natural spoken language only. No asterisks, bullet dashes, or markdown.
- 2-4 sentences max unless teaching a concept.
- CORRECTION and ASSESS tags are parsed silently; everything else is speech.
- Vary energy and how you start each reply.

MODES: {modes}
Each learner message starts with [MODE: ...] naming the mode it was sent in.

Current mode: {mode}
"#,
        tutor = TUTOR_NAME,
        name = name,
        native = language.native_name(),
        level = profile.level(),
        label = profile.level_label(),
        confidence = profile.confidence(),
        sessions = profile.sessions(),
        strengths = join_or(profile.strengths(), usize::MAX, "still discovering"),
        weaknesses = join_or(profile.weaknesses(), usize::MAX, "still discovering"),
        mastered = join_or(profile.mastered_words(), PROMPT_MASTERED_WORDS, "none yet"),
        struggling = join_or(profile.struggling_words(), PROMPT_STRUGGLING_WORDS, "none yet"),
        modes = modes,
        mode = mode,
    )
}

/// Join the last `limit` entries, or return `empty` for an empty list
fn join_or(items: &[String], limit: usize, empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    let start = items.len().saturating_sub(limit);
    items[start..].join(", ")
}
