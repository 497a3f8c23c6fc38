//! Adapter traits at the system boundary

pub mod llm;
pub mod speech;
pub mod vad;

pub use llm::{EventStream, LanguageModel};
pub use speech::{AudioStream, SpeechToText, TextToSpeech};
pub use vad::SpeechDetector;
