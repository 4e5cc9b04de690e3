use tandem_db::Database;
use tandem_types::models::{ConversationId, MessageId, UserId};

use crate::conversation;
use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckOutcome {
    /// The stored read marker after this call
    pub last_read_message_id: MessageId,
    /// Whether this call moved the marker
    pub advanced: bool,
}

/// Record that `user_id` has read `conversation_id` up to `last_message_id`.
/// The marker only moves forward; an older id is accepted and ignored.
pub fn acknowledge(
    db: &Database,
    user_id: UserId,
    conversation_id: ConversationId,
    last_message_id: MessageId,
) -> Result<AckOutcome, ChatError> {
    conversation::require_member(db, conversation_id, user_id)?;

    let message = db
        .get_message(last_message_id)?
        .ok_or(ChatError::MessageNotFound)?;
    if message.conversation_id != conversation_id {
        return Err(ChatError::MessageNotInConversation);
    }

    let advanced = db.upsert_read_ack(conversation_id, user_id, last_message_id)?;
    let last_read_message_id = db
        .get_read_ack(conversation_id, user_id)?
        .unwrap_or(last_message_id);

    Ok(AckOutcome {
        last_read_message_id,
        advanced,
    })
}

/// Messages addressed to `user_id` in this conversation that are newer than
/// their read marker.
pub fn unread_count(
    db: &Database,
    user_id: UserId,
    conversation_id: ConversationId,
) -> Result<i64, ChatError> {
    conversation::require_member(db, conversation_id, user_id)?;
    Ok(db.count_unread(conversation_id, user_id)?)
}
