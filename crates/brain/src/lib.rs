//! The reasoning-with-tools loop
//!
//! One `Brain` per session: owns the conversation history and turns user
//! input into a stream of `BrainUpdate`s plus queued TTS requests, calling
//! tools iteratively until the model stops asking for them.

pub mod brain;

pub use brain::{Brain, BrainOptions, TurnOutcome};

/// Fallback reply when the model keeps requesting tools past the
/// iteration cap.
pub const EXHAUSTION_MESSAGE: &str = "I was unable to complete that in the allotted steps.";

/// Bilingual fallback when the LLM backend fails mid-reply.
pub const BACKEND_ERROR_MESSAGE: &str = "服务暂时不可用 / Service temporarily unavailable";
