//! LLM request/response types
//!
//! Common types for talking to chat-completion backends. The streaming
//! surface is a closed event sum so consumers handle every case the wire can
//! produce, including fragmented tool-call arguments.

use serde::{Deserialize, Serialize};

/// Chat message handed to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool call id this message answers (role = tool)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Calls issued by an assistant message, serialized per backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<AssistantToolCall>>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Assistant message that carries tool calls.
    pub fn assistant_with_calls(
        content: impl Into<String>,
        calls: Vec<AssistantToolCall>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Some(calls),
        }
    }

    /// Tool response message answering `tool_call_id`.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A completed tool call as recorded on an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument JSON exactly as the model produced it
    pub arguments: String,
}

/// Tool definition exposed to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for parameters (`type: object` at minimum)
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// One event from a streaming generation
///
/// Tool-call arguments arrive in fragments; the consumer accumulates
/// `ToolCallDelta`s by `index` until `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Reasoning/thinking delta, when the backend exposes it
    ThoughtDelta(String),
    /// Visible reply text delta
    TextDelta(String),
    /// Fragment of a tool call at declaration position `index`
    ToolCallDelta {
        index: usize,
        /// Call id; present on the first fragment for most backends
        id: Option<String>,
        /// Tool name; present on the first fragment for most backends
        name: Option<String>,
        /// Raw argument JSON fragment (may be empty)
        args_chunk: String,
    },
    /// Stream completed
    Done,
}

impl LlmEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, LlmEvent::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let m = Message::tool("42", "call_1");
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.tool_call_id.as_deref(), Some("call_1"));

        let m = Message::assistant_with_calls(
            "",
            vec![AssistantToolCall {
                id: "call_1".into(),
                name: "time".into(),
                arguments: "{}".into(),
            }],
        );
        assert_eq!(m.tool_calls.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn test_event_done() {
        assert!(LlmEvent::Done.is_done());
        assert!(!LlmEvent::TextDelta("x".into()).is_done());
    }
}
