//! Language definitions for the bilingual assistant

use serde::{Deserialize, Serialize};

/// Languages the assistant speaks and transcribes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[serde(rename = "zh")]
    Chinese,
    #[serde(rename = "en")]
    English,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Language {
    /// Code used on the wire and in configuration.
    pub fn code(&self) -> &'static str {
        match self {
            Language::Chinese => "zh",
            Language::English => "en",
            Language::Unknown => "unknown",
        }
    }

    /// Parse a language code, tolerating regional variants ("zh-CN", "en-US").
    pub fn from_code(code: &str) -> Self {
        let lower = code.to_ascii_lowercase();
        if lower == "zh" || lower.starts_with("zh-") || lower.starts_with("zh_") {
            Language::Chinese
        } else if lower == "en" || lower.starts_with("en-") || lower.starts_with("en_") {
            Language::English
        } else {
            Language::Unknown
        }
    }

    /// Sentence terminators for speakable-chunk splitting.
    pub fn sentence_terminators(&self) -> &'static [char] {
        &['.', '!', '?', '。', '！', '？']
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        assert_eq!(Language::from_code("zh"), Language::Chinese);
        assert_eq!(Language::from_code("zh-CN"), Language::Chinese);
        assert_eq!(Language::from_code("en-US"), Language::English);
        assert_eq!(Language::from_code("fr"), Language::Unknown);
        assert_eq!(Language::Chinese.code(), "zh");
    }

    #[test]
    fn test_serde_codes() {
        let json = serde_json::to_string(&Language::Chinese).unwrap();
        assert_eq!(json, "\"zh\"");
        let back: Language = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(back, Language::English);
    }
}
