//! Wire protocol frames
//!
//! One duplex channel per session carries binary PCM frames and JSON text
//! frames. Every JSON frame has the shape
//! `{type, content, is_final?, metadata?, msg_id?, session_id?}` with
//! `type ∈ {signal, transcript, text, update, input, interrupt}`. Unknown
//! fields are ignored; an unknown `type` decodes to `ClientFrame::Unknown`
//! so the caller can log and drop it without closing the connection.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transcript::Transcript;
use crate::update::{BrainUpdate, UpdateKind};

/// Raw JSON frame shape shared by both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl WireFrame {
    fn new(frame_type: &str, content: impl Into<String>) -> Self {
        Self {
            frame_type: frame_type.to_string(),
            content: content.into(),
            is_final: None,
            metadata: None,
            msg_id: None,
            session_id: None,
        }
    }

    pub fn to_json(&self) -> String {
        // WireFrame contains only JSON-representable fields.
        serde_json::to_string(self).expect("wire frame serializes")
    }
}

/// Item on the single outbound channel drained by the session's frame writer
///
/// All producers (session signals, brain updates, audio egress) enqueue here
/// so delivery order is the enqueue order.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// JSON text frame
    Frame(WireFrame),
    /// Binary PCM frame, Int16LE mono
    Audio(Vec<u8>),
}

/// Frames a client may send
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Direct text turn
    Input { content: String },
    /// Explicit cancel of the current reply
    Interrupt,
    /// Recognized JSON with an unrecognized `type`; log and drop
    Unknown { frame_type: String },
}

impl ClientFrame {
    /// Decode one inbound JSON text frame.
    ///
    /// Malformed JSON is a protocol error; an unknown `type` is not.
    pub fn decode(text: &str) -> Result<Self> {
        let frame: WireFrame = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("malformed frame: {e}")))?;

        Ok(match frame.frame_type.as_str() {
            "input" => ClientFrame::Input {
                content: frame.content,
            },
            "interrupt" => ClientFrame::Interrupt,
            other => ClientFrame::Unknown {
                frame_type: other.to_string(),
            },
        })
    }
}

/// Out-of-band lifecycle signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Ready,
    ProcessingStarted,
    ProcessingEnded,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Ready => "ready",
            Signal::ProcessingStarted => "processing_started",
            Signal::ProcessingEnded => "processing_ended",
        }
    }
}

/// Update categories surfaced on `update` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireUpdateType {
    Thought,
    ToolCall,
    ToolResult,
    /// Mid-reply subsystem failure, carries `status: "error"`
    Error,
}

impl WireUpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireUpdateType::Thought => "THOUGHT",
            WireUpdateType::ToolCall => "TOOL_CALL",
            WireUpdateType::ToolResult => "TOOL_RESULT",
            WireUpdateType::Error => "ERROR",
        }
    }
}

/// Builders for every outbound JSON frame the session emits
pub struct ServerFrame;

impl ServerFrame {
    pub fn signal(signal: Signal) -> WireFrame {
        WireFrame::new("signal", signal.as_str())
    }

    pub fn transcript(transcript: &Transcript) -> WireFrame {
        let mut frame = WireFrame::new("transcript", transcript.text.clone());
        frame.is_final = Some(transcript.is_final);
        frame.metadata = Some(serde_json::json!({
            "language": transcript.language.code(),
            "confidence": transcript.confidence,
        }));
        frame
    }

    /// Transcript frame for a failed recognition: empty text, error metadata.
    pub fn transcript_error(kind: &str) -> WireFrame {
        let mut frame = WireFrame::new("transcript", "");
        frame.is_final = Some(true);
        frame.metadata = Some(serde_json::json!({ "error": kind }));
        frame
    }

    pub fn text(msg_id: &str, turn: u32, delta: &str, is_final: bool) -> WireFrame {
        let mut frame = WireFrame::new("text", delta);
        frame.is_final = Some(is_final);
        frame.msg_id = Some(msg_id.to_string());
        frame.metadata = Some(serde_json::json!({ "turn": turn }));
        frame
    }

    /// Map one brain update to its wire frame.
    ///
    /// `TtsRequest`-side effects are not represented here; every other
    /// update kind has exactly one frame.
    pub fn from_update(update: &BrainUpdate) -> WireFrame {
        let msg_id = update.msg_id.as_str();
        let turn = update.turn;
        match &update.kind {
            UpdateKind::Thought(delta) => {
                Self::update(msg_id, turn, WireUpdateType::Thought, delta, false, |_| {})
            }
            UpdateKind::ToolCallStart {
                index,
                name,
                arguments_partial,
            } => Self::update(
                msg_id,
                turn,
                WireUpdateType::ToolCall,
                arguments_partial,
                false,
                |meta| {
                    meta.insert("index".into(), (*index).into());
                    meta.insert("name".into(), name.clone().into());
                    meta.insert("arguments".into(), arguments_partial.clone().into());
                },
            ),
            UpdateKind::ToolCallArgsDelta { index, delta } => Self::update(
                msg_id,
                turn,
                WireUpdateType::ToolCall,
                delta,
                false,
                |meta| {
                    meta.insert("index".into(), (*index).into());
                },
            ),
            UpdateKind::ToolCallEnd { index, status } => Self::update(
                msg_id,
                turn,
                WireUpdateType::ToolCall,
                "",
                true,
                |meta| {
                    meta.insert("index".into(), (*index).into());
                    meta.insert("status".into(), status.as_str().into());
                },
            ),
            UpdateKind::ToolResult {
                index,
                content,
                status,
            } => Self::update(
                msg_id,
                turn,
                WireUpdateType::ToolResult,
                content,
                true,
                |meta| {
                    meta.insert("index".into(), (*index).into());
                    meta.insert("status".into(), status.as_str().into());
                },
            ),
            UpdateKind::Error { message } => Self::update(
                msg_id,
                turn,
                WireUpdateType::Error,
                message,
                true,
                |meta| {
                    meta.insert("status".into(), "error".into());
                },
            ),
            UpdateKind::TextDelta(delta) => Self::text(msg_id, turn, delta, false),
            UpdateKind::TurnEnd => Self::text(msg_id, turn, "", true),
        }
    }

    fn update(
        msg_id: &str,
        turn: u32,
        update_type: WireUpdateType,
        content: &str,
        is_final: bool,
        fill: impl FnOnce(&mut serde_json::Map<String, serde_json::Value>),
    ) -> WireFrame {
        let mut meta = serde_json::Map::new();
        meta.insert("update_type".into(), update_type.as_str().into());
        meta.insert("turn".into(), turn.into());
        fill(&mut meta);

        let mut frame = WireFrame::new("update", content);
        frame.is_final = Some(is_final);
        frame.msg_id = Some(msg_id.to_string());
        frame.metadata = Some(serde_json::Value::Object(meta));
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::update::ToolStatus;

    #[test]
    fn test_decode_input() {
        let frame = ClientFrame::decode(r#"{"type":"input","content":"hello"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Input {
                content: "hello".into()
            }
        );
    }

    #[test]
    fn test_decode_interrupt() {
        let frame = ClientFrame::decode(r#"{"type":"interrupt"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Interrupt);
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let frame = ClientFrame::decode(r#"{"type":"debug","foo":1}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Unknown {
                frame_type: "debug".into()
            }
        );
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let frame =
            ClientFrame::decode(r#"{"type":"input","content":"hi","color":"red"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Input { .. }));
    }

    #[test]
    fn test_malformed_json_is_protocol_error() {
        let err = ClientFrame::decode("{not json").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_wire_frame_round_trip() {
        let frames = vec![
            ServerFrame::signal(Signal::Ready),
            ServerFrame::transcript(&Transcript::new("现在几点", Language::Chinese, 0.95)),
            ServerFrame::transcript_error("inference"),
            ServerFrame::text("m1", 0, "Hi!", true),
            ServerFrame::from_update(&BrainUpdate::new(
                "m1",
                0,
                UpdateKind::ToolResult {
                    index: 0,
                    content: "2024-01-15 14:30:25".into(),
                    status: ToolStatus::Ok,
                },
            )),
        ];

        for frame in frames {
            let json = frame.to_json();
            let back: WireFrame = serde_json::from_str(&json).unwrap();
            assert_eq!(frame, back);
        }
    }

    #[test]
    fn test_update_frame_metadata() {
        let update = BrainUpdate::new(
            "m1",
            2,
            UpdateKind::ToolCallStart {
                index: 0,
                name: "time".into(),
                arguments_partial: "{".into(),
            },
        );
        let frame = ServerFrame::from_update(&update);
        assert_eq!(frame.frame_type, "update");
        let meta = frame.metadata.unwrap();
        assert_eq!(meta["update_type"], "TOOL_CALL");
        assert_eq!(meta["turn"], 2);
        assert_eq!(meta["name"], "time");
    }

    #[test]
    fn test_turn_end_maps_to_final_text() {
        let frame = ServerFrame::from_update(&BrainUpdate::new("m1", 1, UpdateKind::TurnEnd));
        assert_eq!(frame.frame_type, "text");
        assert_eq!(frame.is_final, Some(true));
        assert!(frame.content.is_empty());
    }
}
