use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use tandem_db::Database;
use tandem_db::models::NewMessage;
use tandem_types::events::ServerEvent;
use tandem_types::models::{ChatMessage, ContentType, ConversationType, MessageContent, UserId, UserPair};

use crate::error::ChatError;
use crate::registry::SessionRegistry;
use crate::{conversation, friends};

pub const MAX_TEXT_CHARS: usize = 4000;
pub const MAX_COMPOUND_PARTS: usize = 16;
pub const MAX_FRIEND_REQUEST_CHARS: usize = 500;

/// A message that made it to storage.
#[derive(Debug, Clone)]
pub struct Submitted {
    /// The message as it was fanned out, with id, conversation and timestamp filled in
    pub message: ChatMessage,
    /// Number of connections (across both parties) that accepted the frame
    pub delivered: usize,
}

/// Validate, gate, persist, then fan out.
///
/// Nothing reaches storage unless every check passes, and nothing is fanned
/// out unless storage succeeded.
#[derive(Clone)]
pub struct MessagePipeline {
    db: Arc<Database>,
    sessions: SessionRegistry,
}

impl MessagePipeline {
    pub fn new(db: Arc<Database>, sessions: SessionRegistry) -> Self {
        Self { db, sessions }
    }

    pub fn submit(&self, sender_id: UserId, message: ChatMessage) -> Result<Submitted, ChatError> {
        if message.from != sender_id {
            warn!(
                "User {} tried to send a message as {}",
                sender_id, message.from
            );
            return Err(ChatError::SenderMismatch);
        }
        if message.conversation_type != ConversationType::Private {
            return Err(ChatError::UnsupportedConversationType);
        }
        if message.to == sender_id {
            return Err(ChatError::SelfAddressed);
        }

        let mut message = message;
        validate_content(&mut message.content)?;

        let receiver_id = message.to;
        if self.db.get_user(receiver_id)?.is_none() {
            return Err(ChatError::UserNotFound);
        }

        let content_type = message.content.content_type();
        if content_type != ContentType::FriendRequest
            && !friends::are_friends(&self.db, sender_id, receiver_id)?
        {
            debug!("User {} is not friends with {}", sender_id, receiver_id);
            return Err(ChatError::NotFriends);
        }

        let conversation = match message.conversation_id {
            Some(conversation_id) => {
                let row = self
                    .db
                    .get_conversation(conversation_id)?
                    .ok_or(ChatError::ConversationNotFound)?;
                if conversation::members(&row) != UserPair::new(sender_id, receiver_id) {
                    return Err(ChatError::ConversationMismatch);
                }
                row
            }
            None => conversation::resolve_or_create(&self.db, sender_id, receiver_id)?,
        };

        if let Some(reply_to) = message.reply_to {
            match self.db.get_message(reply_to)? {
                Some(target) if target.conversation_id == conversation.id && !target.is_deleted => {}
                _ => return Err(ChatError::InvalidReply),
            }
        }

        let body = serde_json::to_string(&message.content)
            .map_err(|e| ChatError::Storage(e.into()))?;
        let row = self.db.insert_message(&NewMessage {
            conversation_id: conversation.id,
            sender_id,
            receiver_id,
            content_type: content_type.code(),
            content: &body,
            reply_to: message.reply_to,
            sent_at: Utc::now(),
        })?;

        let message = ChatMessage {
            message_id: row.id,
            conversation_id: Some(conversation.id),
            sent_at: Some(row.sent_at),
            ..message
        };
        debug!(
            "Stored message {} in conversation {} ({} -> {})",
            row.id, conversation.id, sender_id, receiver_id
        );

        let event = ServerEvent::Chat(message.clone());
        let delivered = self.sessions.send_to_user(receiver_id, &event)
            + self.sessions.send_to_user(sender_id, &event);

        Ok(Submitted { message, delivered })
    }
}

/// Check a payload against its content-type rules. Friend requests always
/// enter storage unaccepted, whatever the client claimed.
pub fn validate_content(content: &mut MessageContent) -> Result<(), ChatError> {
    match content {
        MessageContent::Text(text) => check_text(&text.content),
        MessageContent::Compound(compound) => {
            if compound.parts.is_empty() {
                return Err(ChatError::InvalidContent("compound message has no parts".into()));
            }
            if compound.parts.len() > MAX_COMPOUND_PARTS {
                return Err(ChatError::InvalidContent(format!(
                    "compound message has more than {MAX_COMPOUND_PARTS} parts"
                )));
            }
            compound.parts.iter().try_for_each(|part| check_text(&part.content))
        }
        MessageContent::FriendRequest(request) => {
            if let Some(note) = &request.message {
                if note.chars().count() > MAX_FRIEND_REQUEST_CHARS {
                    return Err(ChatError::InvalidContent(format!(
                        "friend request message is longer than {MAX_FRIEND_REQUEST_CHARS} characters"
                    )));
                }
            }
            request.is_accepted = false;
            Ok(())
        }
    }
}

fn check_text(text: &str) -> Result<(), ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::InvalidContent("content is empty".into()));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(ChatError::InvalidContent(format!(
            "content is longer than {MAX_TEXT_CHARS} characters"
        )));
    }
    Ok(())
}
