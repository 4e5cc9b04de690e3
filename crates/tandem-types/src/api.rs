use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, ConversationType, UserId};

// -- JWT Claims --

/// Handshake token claims, shared by the REST middleware and the gateway
/// upgrade. Issuing tokens is the auth service's job; this side only verifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub exp: usize,
}

// -- Friends --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AcceptFriendRequest {
    pub origin_user_id: UserId,
}

// -- Chat list --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateChatSummary {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub username: String,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_preview: Option<String>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatListEntry {
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    pub info: PrivateChatSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatListEntry>,
}
