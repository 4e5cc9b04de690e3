use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub type UserId = i64;
pub type ConversationId = i64;
pub type MessageId = i64;

/// An unordered pair of users, stored as `(low, high)`.
///
/// Conversations and friend relations are both keyed by this pair, so every
/// lookup and insert goes through [`UserPair::new`]. Ordering assumes integer
/// user identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserPair {
    low: UserId,
    high: UserId,
}

impl UserPair {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The member that is not `user_id`, or `None` if `user_id` is not in the pair.
    pub fn other(&self, user_id: UserId) -> Option<UserId> {
        if self.low == user_id {
            Some(self.high)
        } else if self.high == user_id {
            Some(self.low)
        } else {
            None
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.low == self.high
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    #[default]
    Private,
    Group,
}

/// Content type tag. The numeric codes are what the `messages` table stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Compound,
    FriendRequest,
}

impl ContentType {
    pub fn code(self) -> i64 {
        match self {
            Self::Text => 0,
            Self::Compound => 1,
            Self::FriendRequest => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Text),
            1 => Some(Self::Compound),
            2 => Some(Self::FriendRequest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    Text,
    /// `content` holds an opaque object-storage key.
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundPart {
    #[serde(rename = "type")]
    pub kind: PartKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundContent {
    pub parts: Vec<CompoundPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub is_accepted: bool,
}

/// Message payload, one variant per [`ContentType`].
///
/// Serializes as the bare inner payload; the tag travels next to it
/// (`contentType` on the wire, `content_type` in storage).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(TextContent),
    Compound(CompoundContent),
    FriendRequest(FriendRequestContent),
}

impl MessageContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(TextContent {
            content: content.into(),
        })
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text(_) => ContentType::Text,
            Self::Compound(_) => ContentType::Compound,
            Self::FriendRequest(_) => ContentType::FriendRequest,
        }
    }

    /// Rebuild a payload from its tag and untyped JSON body.
    pub fn from_parts(content_type: ContentType, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match content_type {
            ContentType::Text => Self::Text(serde_json::from_value(value)?),
            ContentType::Compound => Self::Compound(serde_json::from_value(value)?),
            ContentType::FriendRequest => Self::FriendRequest(serde_json::from_value(value)?),
        })
    }

    /// Short human-readable summary used by the chat list.
    pub fn preview(&self) -> String {
        match self {
            Self::Text(text) => text.content.clone(),
            Self::Compound(_) => "[compound message]".to_string(),
            Self::FriendRequest(_) => "[friend request]".to_string(),
        }
    }
}

/// A private chat message as it travels over the gateway.
///
/// Inbound frames leave `message_id` at 0 and `sent_at` empty; the server fills
/// both once the message is persisted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireChatMessage")]
pub struct ChatMessage {
    pub message_id: MessageId,
    pub conversation_type: ConversationType,
    pub conversation_id: Option<ConversationId>,
    pub from: UserId,
    pub to: UserId,
    pub reply_to: Option<MessageId>,
    pub content: MessageContent,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChatMessage {
    #[serde(default)]
    message_id: MessageId,
    #[serde(default)]
    conversation_type: ConversationType,
    #[serde(default)]
    conversation_id: Option<ConversationId>,
    from: UserId,
    to: UserId,
    #[serde(default)]
    reply_to: Option<MessageId>,
    content_type: ContentType,
    content: Value,
    #[serde(default)]
    sent_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireChatMessageRef<'a> {
    message_id: MessageId,
    conversation_type: ConversationType,
    conversation_id: Option<ConversationId>,
    from: UserId,
    to: UserId,
    reply_to: Option<MessageId>,
    content_type: ContentType,
    content: &'a MessageContent,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<WireChatMessage> for ChatMessage {
    type Error = serde_json::Error;

    fn try_from(wire: WireChatMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            message_id: wire.message_id,
            conversation_type: wire.conversation_type,
            conversation_id: wire.conversation_id,
            from: wire.from,
            to: wire.to,
            reply_to: wire.reply_to,
            content: MessageContent::from_parts(wire.content_type, wire.content)?,
            sent_at: wire.sent_at,
        })
    }
}

impl Serialize for ChatMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireChatMessageRef {
            message_id: self.message_id,
            conversation_type: self.conversation_type,
            conversation_id: self.conversation_id,
            from: self.from,
            to: self.to,
            reply_to: self.reply_to,
            content_type: self.content.content_type(),
            content: &self.content,
            sent_at: self.sent_at,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pair_is_order_independent() {
        let a = UserPair::new(7, 3);
        let b = UserPair::new(3, 7);
        assert_eq!(a, b);
        assert_eq!(a.low(), 3);
        assert_eq!(a.high(), 7);
        assert_eq!(a.other(3), Some(7));
        assert_eq!(a.other(9), None);
        assert!(UserPair::new(4, 4).is_degenerate());
    }

    #[test]
    fn chat_message_parses_tagged_content() {
        let raw = json!({
            "from": 1,
            "to": 2,
            "contentType": "compound",
            "content": { "parts": [
                { "type": "text", "content": "look" },
                { "type": "image", "content": "uploads/cat.png" }
            ]}
        });

        let msg: ChatMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.message_id, 0);
        assert_eq!(msg.conversation_type, ConversationType::Private);
        assert_eq!(msg.content.content_type(), ContentType::Compound);
        match msg.content {
            MessageContent::Compound(c) => assert_eq!(c.parts[1].kind, PartKind::Image),
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn unknown_content_type_is_rejected() {
        let raw = json!({
            "from": 1,
            "to": 2,
            "contentType": "sticker",
            "content": { "id": 4 }
        });
        assert!(serde_json::from_value::<ChatMessage>(raw).is_err());
    }

    #[test]
    fn content_shape_must_match_tag() {
        let raw = json!({
            "from": 1,
            "to": 2,
            "contentType": "text",
            "content": { "parts": [] }
        });
        assert!(serde_json::from_value::<ChatMessage>(raw).is_err());
    }

    #[test]
    fn serializes_with_camel_case_tag_beside_content() {
        let msg = ChatMessage {
            message_id: 12,
            conversation_type: ConversationType::Private,
            conversation_id: Some(3),
            from: 1,
            to: 2,
            reply_to: None,
            content: MessageContent::FriendRequest(FriendRequestContent {
                message: Some("hi".into()),
                is_accepted: false,
            }),
            sent_at: None,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["messageId"], 12);
        assert_eq!(value["conversationId"], 3);
        assert_eq!(value["contentType"], "friend_request");
        assert_eq!(value["content"], json!({ "message": "hi", "isAccepted": false }));
    }
}
