use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{ChatMessage, ConversationId, ConversationType, MessageId};

/// Frames sent FROM server TO client over the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Informational notice, sent once after the connection is established
    System(String),

    /// A request on this connection was declined; the connection stays open
    Error(String),

    /// Reply to a client heartbeat
    Heartbeat(HeartbeatData),

    /// A persisted chat message, fanned out to every live connection of both parties
    Chat(ChatMessage),

    /// One page of history, oldest first
    RequestHistory(Vec<ChatMessage>),
}

/// Frames sent FROM client TO server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    Chat(ChatMessage),
    Heartbeat(HeartbeatData),
    Ack(AckData),
    RequestHistory(HistoryRequest),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatData {
    #[serde(default)]
    pub timestamp: i64,
}

impl HeartbeatData {
    pub fn now() -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckData {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub conversation_type: ConversationType,
    pub last_message_id: MessageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub conversation_type: ConversationType,
    /// Page strictly before this id; absent (or <= 0) starts from the newest message.
    #[serde(default)]
    pub last_message_id: Option<MessageId>,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported message type: {0}")]
    UnknownType(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl ClientCommand {
    /// Parse a text frame, telling an unknown `type` apart from a bad payload.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let Envelope { kind, data } = serde_json::from_str(text)?;

        let command = match kind.as_str() {
            "chat" => Self::Chat(serde_json::from_value(data)?),
            "heartbeat" => {
                // Clients may send a bare `{"type":"heartbeat"}`
                if data.is_null() {
                    Self::Heartbeat(HeartbeatData::default())
                } else {
                    Self::Heartbeat(serde_json::from_value(data)?)
                }
            }
            "ack" => Self::Ack(serde_json::from_value(data)?),
            "request-history" => Self::RequestHistory(serde_json::from_value(data)?),
            _ => return Err(FrameError::UnknownType(kind)),
        };

        Ok(command)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat(_) => "chat",
            Self::Heartbeat(_) => "heartbeat",
            Self::Ack(_) => "ack",
            Self::RequestHistory(_) => "request-history",
        }
    }
}
