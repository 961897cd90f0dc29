//! Target languages the tutor can teach
//!
//! Each language carries its display names, the locale used for speech
//! recognition, and the handful of phrases the tutor uses outside of
//! model-generated replies (greetings, apologies).

use serde::{Deserialize, Serialize};

/// Locale used for recognition while the learner still mostly speaks English
pub const BASE_RECOGNITION_LOCALE: &str = "en-US";

/// Level at which recognition switches to the target-language locale
pub const TARGET_RECOGNITION_MIN_LEVEL: u8 = 5;

/// Supported target languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    #[default]
    German,
    French,
    Spanish,
    Italian,
    Japanese,
    Portuguese,
}

impl TargetLanguage {
    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::German => "de",
            Self::French => "fr",
            Self::Spanish => "es",
            Self::Italian => "it",
            Self::Japanese => "ja",
            Self::Portuguese => "pt",
        }
    }

    /// English name
    pub fn name(&self) -> &'static str {
        match self {
            Self::German => "German",
            Self::French => "French",
            Self::Spanish => "Spanish",
            Self::Italian => "Italian",
            Self::Japanese => "Japanese",
            Self::Portuguese => "Portuguese",
        }
    }

    /// Name of the language in the language itself
    pub fn native_name(&self) -> &'static str {
        match self {
            Self::German => "Deutsch",
            Self::French => "Français",
            Self::Spanish => "Español",
            Self::Italian => "Italiano",
            Self::Japanese => "日本語",
            Self::Portuguese => "Português",
        }
    }

    /// BCP-47 locale for the speech recognizer
    pub fn recognition_locale(&self) -> &'static str {
        match self {
            Self::German => "de-DE",
            Self::French => "fr-FR",
            Self::Spanish => "es-ES",
            Self::Italian => "it-IT",
            Self::Japanese => "ja-JP",
            Self::Portuguese => "pt-BR",
        }
    }

    /// Locale to capture with at a given learner level
    ///
    /// Beginners answer mostly in English, so recognition stays on the base
    /// locale until the learner reaches the intermediate bands.
    pub fn capture_locale(&self, level: u8) -> &'static str {
        if level >= TARGET_RECOGNITION_MIN_LEVEL {
            self.recognition_locale()
        } else {
            BASE_RECOGNITION_LOCALE
        }
    }

    pub fn hello(&self) -> &'static str {
        match self {
            Self::German => "Hallo",
            Self::French => "Bonjour",
            Self::Spanish => "¡Hola",
            Self::Italian => "Ciao",
            Self::Japanese => "こんにちは",
            Self::Portuguese => "Olá",
        }
    }

    pub fn welcome_back(&self) -> &'static str {
        match self {
            Self::German => "Willkommen zurück",
            Self::French => "Bon retour",
            Self::Spanish => "¡Bienvenido de nuevo",
            Self::Italian => "Bentornato",
            Self::Japanese => "おかえりなさい",
            Self::Portuguese => "Bem-vindo de volta",
        }
    }

    pub fn sorry(&self) -> &'static str {
        match self {
            Self::German => "Entschuldigung",
            Self::French => "Désolé",
            Self::Spanish => "Lo siento",
            Self::Italian => "Scusa",
            Self::Japanese => "すみません",
            Self::Portuguese => "Desculpe",
        }
    }

    /// Parse from a code or English name (case-insensitive)
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "de" | "german" | "deutsch" => Some(Self::German),
            "fr" | "french" | "français" | "francais" => Some(Self::French),
            "es" | "spanish" | "español" | "espanol" => Some(Self::Spanish),
            "it" | "italian" | "italiano" => Some(Self::Italian),
            "ja" | "japanese" => Some(Self::Japanese),
            "pt" | "portuguese" | "português" | "portugues" => Some(Self::Portuguese),
            _ => None,
        }
    }

    /// Parse a code, falling back to German for unknown values
    pub fn from_code_or_default(code: &str) -> Self {
        Self::from_str_loose(code).unwrap_or_default()
    }

    pub fn all() -> &'static [TargetLanguage] {
        &[
            Self::German,
            Self::French,
            Self::Spanish,
            Self::Italian,
            Self::Japanese,
            Self::Portuguese,
        ]
    }
}

impl std::fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_locale_switches_at_intermediate() {
        let lang = TargetLanguage::French;
        assert_eq!(lang.capture_locale(0), "en-US");
        assert_eq!(lang.capture_locale(4), "en-US");
        assert_eq!(lang.capture_locale(5), "fr-FR");
        assert_eq!(lang.capture_locale(10), "fr-FR");
    }

    #[test]
    fn test_from_str_loose() {
        assert_eq!(TargetLanguage::from_str_loose(" DE "), Some(TargetLanguage::German));
        assert_eq!(TargetLanguage::from_str_loose("Italian"), Some(TargetLanguage::Italian));
        assert_eq!(TargetLanguage::from_str_loose("klingon"), None);
        assert_eq!(TargetLanguage::from_code_or_default("xx"), TargetLanguage::German);
    }

    #[test]
    fn test_codes_round_trip() {
        for lang in TargetLanguage::all() {
            assert_eq!(TargetLanguage::from_str_loose(lang.code()), Some(*lang));
        }
    }
}
