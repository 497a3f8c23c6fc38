//! Brain output events
//!
//! Everything the reasoning loop tells the outside world goes through
//! `BrainUpdate`, a closed sum over one assistant reply. Updates for a reply
//! share its `msg_id`; `turn` counts reasoning iterations within the reply.

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Outcome attached to tool-call lifecycle updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Ok => "ok",
            ToolStatus::Error => "error",
        }
    }
}

/// One streamed update from the brain
#[derive(Debug, Clone, PartialEq)]
pub struct BrainUpdate {
    /// Stable id of the assistant reply this update belongs to
    pub msg_id: String,
    /// Reasoning iteration within the reply, monotonic from 0
    pub turn: u32,
    pub kind: UpdateKind,
}

/// The update payload
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    /// Model reasoning delta
    Thought(String),
    /// A tool call opened at declaration position `index`
    ToolCallStart {
        index: usize,
        name: String,
        arguments_partial: String,
    },
    /// Argument JSON fragment for an open call
    ToolCallArgsDelta { index: usize, delta: String },
    /// The call's argument stream is complete
    ToolCallEnd { index: usize, status: ToolStatus },
    /// Result of invoking the call at `index`
    ToolResult {
        index: usize,
        content: String,
        status: ToolStatus,
    },
    /// Visible reply text delta
    TextDelta(String),
    /// A subsystem failed mid-reply; the reply still ends cleanly
    Error { message: String },
    /// The reply is complete; no further updates carry this msg_id
    TurnEnd,
}

impl BrainUpdate {
    pub fn new(msg_id: impl Into<String>, turn: u32, kind: UpdateKind) -> Self {
        Self {
            msg_id: msg_id.into(),
            turn,
            kind,
        }
    }

    pub fn is_turn_end(&self) -> bool {
        matches!(self.kind, UpdateKind::TurnEnd)
    }
}

/// One unit of text queued for synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct TtsRequest {
    pub text: String,
    pub language: Language,
    /// Voice identifier resolved from the language by configuration
    pub voice: String,
    /// Reply this audio belongs to
    pub msg_id: String,
}
