//! LLM integration
//!
//! Streaming chat-completion backend for OpenAI-compatible endpoints
//! (OpenRouter is the reference deployment). Emits the core `LlmEvent` sum,
//! including fragmented tool-call arguments exactly as the wire delivers
//! them.

pub mod backend;

pub use backend::{BackendConfig, OpenRouterBackend};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stream inactive for {0}s")]
    Inactivity(u64),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for voxchat_core::Error {
    fn from(err: LlmError) -> Self {
        voxchat_core::Error::Llm(err.to_string())
    }
}
