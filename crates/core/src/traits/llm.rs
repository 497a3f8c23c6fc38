//! Language model trait

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::llm_types::{LlmEvent, Message, ToolDefinition};

/// Stream of generation events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<LlmEvent>> + Send>>;

/// Streaming chat-completion backend
///
/// The stream yields `LlmEvent`s until `Done`. Dropping the stream cancels
/// the request. Implementations own their retry policy for connection-level
/// failures; mid-stream failures surface as an `Err` item.
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Start a streaming generation over `messages` with `tools` callable.
    fn stream(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> EventStream;

    /// Whether the backend is reachable.
    async fn is_available(&self) -> bool;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}
