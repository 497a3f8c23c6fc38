//! Speech processing traits
//!
//! ASR and TTS engines live behind these seams. A single engine instance is
//! shared process-wide and must tolerate concurrent calls from multiple
//! sessions; blocking or compute-bound work is the implementation's job to
//! keep off the async runtime (`spawn_blocking` or its own pool).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::audio::{AudioChunk, Utterance};
use crate::error::{Result, TranscriptError};
use crate::transcript::Transcript;

/// Stream of synthesized audio chunks
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send>>;

/// Speech-to-Text interface
///
/// One final `Transcript` per utterance. Failures surface as
/// `TranscriptError` and are reported to the client; they never terminate
/// the session.
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe a complete utterance.
    async fn transcribe(&self, utterance: &Utterance)
        -> std::result::Result<Transcript, TranscriptError>;

    /// Engine name for logging.
    fn engine_name(&self) -> &str;
}

/// Text-to-Speech interface
///
/// Yields decoded PCM chunks lazily so playback can start before synthesis
/// finishes. Dropping the stream cancels synthesis; implementations must not
/// keep producing after the consumer is gone.
pub trait TextToSpeech: Send + Sync + 'static {
    /// Start streaming synthesis of `text` with the given voice.
    fn synthesize(&self, text: &str, voice: &str) -> AudioStream;

    /// Engine name for logging.
    fn engine_name(&self) -> &str;
}
