//! Gateway message types, wire-format frames, and the routed envelope.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::Identity;

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// The integer `type` discriminator carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MessageType {
    AuthRequest,
    VirtualPointer,
    Call,
    NewRoom,
    ErrorResp,
    /// A broadcast type the gateway does not interpret; forwarded as-is.
    Other(i64),
}

impl From<i64> for MessageType {
    fn from(value: i64) -> Self {
        match value {
            1 => MessageType::AuthRequest,
            2 => MessageType::VirtualPointer,
            3 => MessageType::Call,
            4 => MessageType::NewRoom,
            5 => MessageType::ErrorResp,
            other => MessageType::Other(other),
        }
    }
}

impl From<MessageType> for i64 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::AuthRequest => 1,
            MessageType::VirtualPointer => 2,
            MessageType::Call => 3,
            MessageType::NewRoom => 4,
            MessageType::ErrorResp => 5,
            MessageType::Other(other) => other,
        }
    }
}

/// The integer `error_type` carried by `ErrorResp` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum ErrorType {
    ExpiredToken,
}

impl From<ErrorType> for u8 {
    fn from(value: ErrorType) -> Self {
        match value {
            ErrorType::ExpiredToken => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server frames
// ---------------------------------------------------------------------------

/// The first frame a client must send.
#[derive(Debug, Deserialize)]
pub struct AuthRequestFrame {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub token: Option<String>,
}

/// Just the discriminator, read before anything else is required of a frame.
#[derive(Debug, Deserialize)]
pub struct FrameKind {
    #[serde(rename = "type")]
    pub kind: MessageType,
}

/// The routing fields of a broadcast-class or `NewRoom` frame. Everything
/// else in the payload is opaque to the gateway.
#[derive(Debug, Deserialize)]
pub struct RouteHeader {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub classroom_id: i64,
    #[serde(default)]
    pub element_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Server → Client frames
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub error_type: ErrorType,
}

impl ErrorFrame {
    pub fn expired_token() -> Self {
        Self {
            kind: MessageType::ErrorResp,
            error_type: ErrorType::ExpiredToken,
        }
    }
}

/// A personalized video-room credential.
#[derive(Debug, Serialize)]
pub struct JoinTokenFrame<'a> {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub join_token: &'a str,
}

impl<'a> JoinTokenFrame<'a> {
    pub fn new(join_token: &'a str) -> Self {
        Self {
            kind: MessageType::NewRoom,
            join_token,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Text queued on a connection's outbound queue. Shared between every
/// recipient of the same broadcast.
pub type Outbound = Arc<str>;

/// A routed broadcast: payload plus the explicit list of recipients.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: MessageType,
    pub payload: Outbound,
    pub recipients: Vec<Identity>,
}

impl Envelope {
    pub fn new(kind: MessageType, payload: impl Into<Outbound>, recipients: Vec<Identity>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            recipients,
        }
    }
}

/// Collapse newlines into spaces and trim surrounding whitespace so that a
/// payload never contains the outbound frame separator.
pub fn normalize(text: &str) -> String {
    text.replace('\n', " ").trim().to_string()
}
