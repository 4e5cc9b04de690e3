use chrono::Utc;
use tracing::info;

use tandem_db::Database;
use tandem_db::models::ConversationRow;
use tandem_types::models::{ConversationId, UserId, UserPair};

use crate::error::ChatError;

pub fn members(row: &ConversationRow) -> UserPair {
    UserPair::new(row.member_low, row.member_high)
}

/// The one private conversation between `a` and `b`, created on first contact.
/// Argument order does not matter.
pub fn resolve_or_create(db: &Database, a: UserId, b: UserId) -> Result<ConversationRow, ChatError> {
    let pair = UserPair::new(a, b);
    if pair.is_degenerate() {
        return Err(ChatError::SelfAddressed);
    }

    let (row, created) = db.get_or_create_conversation(pair, Utc::now())?;
    if created {
        info!(
            "Created conversation {} between {} and {}",
            row.id,
            pair.low(),
            pair.high()
        );
    }
    Ok(row)
}

/// Load a conversation and check that `user_id` is one of its two members.
pub fn require_member(
    db: &Database,
    conversation_id: ConversationId,
    user_id: UserId,
) -> Result<ConversationRow, ChatError> {
    let row = db
        .get_conversation(conversation_id)?
        .ok_or(ChatError::ConversationNotFound)?;

    if !members(&row).contains(user_id) {
        return Err(ChatError::NotAMember);
    }
    Ok(row)
}
