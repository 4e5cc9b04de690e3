//! Database row types. These map directly to SQLite rows.
//! Distinct from tandem-types wire models to keep the DB layer independent.
use chrono::{DateTime, Utc};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub role: i64,
    pub ban_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: i64,
    pub member_low: i64,
    pub member_high: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content_type: i64,
    /// JSON text; shape depends on `content_type`
    pub content: String,
    pub reply_to: Option<i64>,
    pub sent_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// Insert payload for [`crate::Database::insert_message`]; the id is assigned by SQLite.
pub struct NewMessage<'a> {
    pub conversation_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content_type: i64,
    pub content: &'a str,
    pub reply_to: Option<i64>,
    pub sent_at: DateTime<Utc>,
}

/// Result of [`crate::Database::accept_friendship`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipAcceptance {
    /// The pair was already friends; nothing changed
    AlreadyFriends,
    /// No live friend request from the requester; nothing changed
    NoPendingRequest,
    /// Requests marked accepted and the friend row inserted
    Accepted,
}
