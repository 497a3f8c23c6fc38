//! Core traits and types for the voxchat conversation engine
//!
//! Foundation for all other crates:
//! - Audio frames, utterances, and PCM helpers
//! - Transcripts and language definitions
//! - Conversation history with bounded, pair-safe eviction
//! - Brain update events and TTS requests
//! - Wire protocol frames and codec
//! - Cancellation token
//! - Adapter traits for ASR, TTS, LLM, and VAD backends

pub mod audio;
pub mod cancel;
pub mod error;
pub mod history;
pub mod language;
pub mod llm_types;
pub mod protocol;
pub mod transcript;
pub mod traits;
pub mod update;

pub use audio::{fade_in, fade_out, pcm_f32_to_i16, pcm_i16le_to_f32, AudioChunk, AudioFrame, Utterance};
pub use cancel::{CancelGuard, CancelToken};
pub use error::{Error, Result, TranscriptError};
pub use history::{ConversationHistory, HistoryItem};
pub use language::Language;
pub use llm_types::{AssistantToolCall, LlmEvent, Message, Role, ToolDefinition};
pub use protocol::{ClientFrame, Outbound, ServerFrame, Signal, WireFrame, WireUpdateType};
pub use transcript::Transcript;
pub use traits::{AudioStream, EventStream, LanguageModel, SpeechDetector, SpeechToText, TextToSpeech};
pub use update::{BrainUpdate, ToolStatus, TtsRequest, UpdateKind};
