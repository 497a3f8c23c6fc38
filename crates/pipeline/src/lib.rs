//! Audio pipeline
//!
//! Session-side audio machinery between the transport and the brain:
//! - AudioIngest: inbound PCM → timestamped fixed-size frames
//! - EnergyVad: default per-frame speech detector
//! - Segmenter: frames → utterances + speech-onset interruption signal
//! - SentenceChunker: reply text → speakable chunks
//! - PlaybackWorker: TTS queue consumer with fades and cancel drain
//! - AudioEgress: ordered binary writes with a busy window
//! - HTTP reference adapters for ASR and TTS

pub mod asr;
pub mod chunker;
pub mod egress;
pub mod ingest;
pub mod playback;
pub mod segmenter;
pub mod tts;
pub mod vad;

pub use asr::HttpWhisperAsr;
pub use chunker::SentenceChunker;
pub use egress::AudioEgress;
pub use ingest::AudioIngest;
pub use playback::{PlaybackQueue, PlaybackWorker, QueueItem};
pub use segmenter::{Segmenter, SegmenterEvent};
pub use tts::HttpSpeechTts;
pub use vad::{EnergyVad, EnergyVadConfig};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Segmenter error: {0}")]
    Segmenter(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Resample error: {0}")]
    Resample(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout after {0}s")]
    Timeout(u64),
}

impl From<PipelineError> for voxchat_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Tts(msg) => voxchat_core::Error::Tts(msg),
            PipelineError::ChannelClosed => voxchat_core::Error::ChannelClosed,
            PipelineError::Timeout(s) => voxchat_core::Error::Timeout(s),
            other => voxchat_core::Error::Pipeline(other.to_string()),
        }
    }
}
