use anyhow::anyhow;
use tracing::warn;

use tandem_db::Database;
use tandem_db::models::MessageRow;
use tandem_types::models::{
    ChatMessage, ContentType, ConversationId, ConversationType, MessageContent, MessageId, UserId,
};

use crate::conversation;
use crate::error::ChatError;

/// Rebuild the wire form of a stored message.
pub fn to_chat_message(row: MessageRow) -> anyhow::Result<ChatMessage> {
    let content_type = ContentType::from_code(row.content_type)
        .ok_or_else(|| anyhow!("unknown content type code {}", row.content_type))?;
    let value = serde_json::from_str(&row.content)?;

    Ok(ChatMessage {
        message_id: row.id,
        conversation_type: ConversationType::Private,
        conversation_id: Some(row.conversation_id),
        from: row.sender_id,
        to: row.receiver_id,
        reply_to: row.reply_to,
        content: MessageContent::from_parts(content_type, value)?,
        sent_at: Some(row.sent_at),
    })
}

/// One page of a conversation, oldest first.
///
/// `before` pages backwards from that message id (exclusive); `None` or a
/// non-positive id starts from the newest message. Deleted messages are skipped.
pub fn get_history(
    db: &Database,
    user_id: UserId,
    conversation_id: ConversationId,
    before: Option<MessageId>,
    limit: u32,
) -> Result<Vec<ChatMessage>, ChatError> {
    conversation::require_member(db, conversation_id, user_id)?;

    let before = before.filter(|id| *id > 0);
    let mut rows = db.get_messages_before(conversation_id, before, limit.max(1))?;
    rows.reverse();

    let page = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            match to_chat_message(row) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("Skipping unreadable message {}: {}", id, e);
                    None
                }
            }
        })
        .collect();

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::resolve_or_create;
    use chrono::Utc;
    use tandem_db::models::NewMessage;

    fn seed(db: &Database, conversation_id: i64, from: i64, to: i64, n: usize) -> Vec<i64> {
        (0..n)
            .map(|i| {
                let body = serde_json::to_string(&MessageContent::text(format!("m{}", i + 1))).unwrap();
                db.insert_message(&NewMessage {
                    conversation_id,
                    sender_id: from,
                    receiver_id: to,
                    content_type: ContentType::Text.code(),
                    content: &body,
                    reply_to: None,
                    sent_at: Utc::now(),
                })
                .unwrap()
                .id
            })
            .collect()
    }

    #[test]
    fn pages_backwards_in_ascending_order() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("ann", "Ann").unwrap();
        let b = db.create_user("ben", "Ben").unwrap();
        let conv = resolve_or_create(&db, a, b).unwrap();
        let ids = seed(&db, conv.id, a, b, 10);

        let newest = get_history(&db, b, conv.id, None, 3).unwrap();
        let got: Vec<_> = newest.iter().map(|m| m.message_id).collect();
        assert_eq!(got, ids[7..10].to_vec());
        assert_eq!(newest[0].content, MessageContent::text("m8"));

        let older = get_history(&db, a, conv.id, Some(got[0]), 3).unwrap();
        let got: Vec<_> = older.iter().map(|m| m.message_id).collect();
        assert_eq!(got, ids[4..7].to_vec());

        let oldest = get_history(&db, a, conv.id, Some(ids[0]), 3).unwrap();
        assert!(oldest.is_empty());

        let from_zero = get_history(&db, a, conv.id, Some(0), 3).unwrap();
        assert_eq!(from_zero, newest);
    }

    #[test]
    fn deleted_messages_are_hidden() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("ann", "Ann").unwrap();
        let b = db.create_user("ben", "Ben").unwrap();
        let conv = resolve_or_create(&db, a, b).unwrap();
        let ids = seed(&db, conv.id, a, b, 3);

        db.soft_delete_message(ids[1]).unwrap();
        let page = get_history(&db, a, conv.id, None, 10).unwrap();
        let got: Vec<_> = page.iter().map(|m| m.message_id).collect();
        assert_eq!(got, vec![ids[0], ids[2]]);
    }

    #[test]
    fn outsiders_cannot_read_history() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("ann", "Ann").unwrap();
        let b = db.create_user("ben", "Ben").unwrap();
        let c = db.create_user("cat", "Cat").unwrap();
        let conv = resolve_or_create(&db, a, b).unwrap();

        assert!(matches!(
            get_history(&db, c, conv.id, None, 10),
            Err(ChatError::NotAMember)
        ));
    }
}
