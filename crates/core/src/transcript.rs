//! Transcript types produced by ASR

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// One transcription result for an utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Recognized text (empty on ASR failure)
    pub text: String,
    /// Detected language
    #[serde(default)]
    pub language: Language,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Final transcript for its utterance; partials carry `false`
    #[serde(default = "default_true")]
    pub is_final: bool,
}

fn default_true() -> bool {
    true
}

impl Transcript {
    pub fn new(text: impl Into<String>, language: Language, confidence: f32) -> Self {
        Self {
            text: text.into(),
            language,
            confidence: confidence.clamp(0.0, 1.0),
            is_final: true,
        }
    }

    /// Empty final transcript used when ASR fails.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            language: Language::Unknown,
            confidence: 0.0,
            is_final: true,
        }
    }

    /// Whether there is anything worth handing to the brain.
    pub fn has_speech(&self) -> bool {
        !self.text.trim().is_empty()
    }
}
