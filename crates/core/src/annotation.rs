//! Reply annotation parser
//!
//! The tutor embeds machine-readable tags in its replies:
//!
//! ```text
//! [CORRECTION: "Ich bin gut" -> "Mir geht es gut" | why: idiomatic expression]
//! [ASSESS: level=4 | confidence=6 | strength=greetings | new_word=Hallo]
//! ```
//!
//! Parsing pulls every correction and the first assessment out of the reply,
//! applies the assessment to the learner profile, and returns the text that
//! is safe to display and speak. Parsing is best-effort: tags that do not
//! match the expected shape are left in the text untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::profile::{AssessmentFields, LearnerProfile};

static CORRECTION_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[CORRECTION:\s*"([^"]+)"\s*->\s*"([^"]+)"\s*\|\s*why:\s*([^\]]+)\]"#)
        .expect("valid correction regex")
});

static ASSESS_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[ASSESS:\s*([^\]]+)\]").expect("valid assessment regex"));

static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)?").expect("valid number regex"));

static SPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("valid whitespace regex"));

/// A single correction attached to an assistant turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    /// What the learner said
    pub original: String,
    /// The corrected form
    pub correct: String,
    /// Short explanation
    pub reason: String,
}

/// Result of parsing one tutor reply
#[derive(Debug, Clone)]
pub struct ParsedReply {
    /// Reply with all well-formed annotation tags removed
    pub spoken_text: String,
    /// Every correction found, in reply order
    pub corrections: Vec<Correction>,
    /// Profile after applying the assessment (a copy of the input if none)
    pub profile: LearnerProfile,
    /// Fields of the applied assessment, if the reply carried one
    pub assessment: Option<AssessmentFields>,
}

/// Parse a raw tutor reply against the current profile
///
/// The input profile is never modified.
pub fn parse_reply(raw: &str, profile: &LearnerProfile) -> ParsedReply {
    let corrections = extract_corrections(raw);

    let assessment = ASSESS_TAG
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|body| parse_assessment_body(body.as_str()));

    let updated = match assessment {
        Some(ref fields) => profile.apply_assessment(fields),
        None => profile.clone(),
    };

    ParsedReply {
        spoken_text: strip_tags(raw),
        corrections,
        profile: updated,
        assessment,
    }
}

fn extract_corrections(raw: &str) -> Vec<Correction> {
    CORRECTION_TAG
        .captures_iter(raw)
        .map(|caps| Correction {
            original: caps[1].to_string(),
            correct: caps[2].to_string(),
            reason: caps[3].trim().to_string(),
        })
        .collect()
}

/// Parse the `key=value | key=value` body of an assessment tag
///
/// Fields may be separated by pipes or commas. Unknown keys and fields
/// without a value are skipped; numeric fields take their leading number.
fn parse_assessment_body(body: &str) -> AssessmentFields {
    let mut fields = AssessmentFields::default();

    for part in body.split(|c: char| c == '|' || c == ',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim();

        match key.trim().to_lowercase().as_str() {
            "level" => fields.level = fields.level.or_else(|| leading_number(value)),
            "confidence" => fields.confidence = fields.confidence.or_else(|| leading_number(value)),
            "strength" => fields.strength = fields.strength.take().or_else(|| non_empty(value)),
            "weakness" => fields.weakness = fields.weakness.take().or_else(|| non_empty(value)),
            "new_word" => fields.new_word = fields.new_word.take().or_else(|| non_empty(value)),
            "struggling" => {
                fields.struggling = fields.struggling.take().or_else(|| non_empty(value))
            },
            other => tracing::trace!(key = other, "Ignoring unknown assessment field"),
        }
    }

    fields
}

fn leading_number(value: &str) -> Option<f64> {
    LEADING_NUMBER
        .find(value)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Remove every well-formed correction and assessment tag
///
/// Text without tags is returned unchanged. When tags are removed, the
/// result is trimmed and the gaps they leave collapse to single spaces.
fn strip_tags(raw: &str) -> String {
    if !CORRECTION_TAG.is_match(raw) && !ASSESS_TAG.is_match(raw) {
        return raw.to_string();
    }

    let without_corrections = CORRECTION_TAG.replace_all(raw, "");
    let without_assessments = ASSESS_TAG.replace_all(&without_corrections, "");

    without_assessments
        .lines()
        .map(|line| SPACE_RUN.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
