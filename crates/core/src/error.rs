//! Error taxonomy for the conversation core
//!
//! Each subsystem crate defines its own error enum and converts into this
//! taxonomy at the boundary. Only transport failure or explicit close tears a
//! session down; everything else is handled where it can still be turned into
//! a user-visible event.

use thiserror::Error;

/// Core error type shared across crates
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transcription error: {0}")]
    Transcript(#[from] TranscriptError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout after {0}s")]
    Timeout(u64),

    /// Not a failure; unwinds quietly back to idle.
    #[error("Cancelled")]
    Cancelled,
}

/// ASR failure kinds surfaced to the client as transcript error metadata
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("audio too short")]
    TooShort,

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl TranscriptError {
    /// Stable kind string for wire metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            TranscriptError::TooShort => "too_short",
            TranscriptError::Unavailable(_) => "unavailable",
            TranscriptError::Inference(_) => "inference",
        }
    }
}

impl Error {
    /// True when the error should unwind without being reported as a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_error_kind() {
        assert_eq!(TranscriptError::TooShort.kind(), "too_short");
        assert_eq!(
            TranscriptError::Inference("boom".into()).kind(),
            "inference"
        );
    }

    #[test]
    fn test_cancelled_is_not_a_fault() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Llm("x".into()).is_cancelled());
    }
}
