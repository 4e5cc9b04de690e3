use std::sync::Arc;

use tracing::warn;

use tandem_db::Database;
use tandem_db::models::FriendshipAcceptance;
use tandem_types::api::{ChatListEntry, PrivateChatSummary};
use tandem_types::models::{
    ChatMessage, ConversationId, ConversationType, MessageContent, MessageId, UserId,
};

use crate::ack::{self, AckOutcome};
use crate::error::ChatError;
use crate::pipeline::{MessagePipeline, Submitted};
use crate::registry::SessionRegistry;
use crate::{conversation, friends, history};

/// Sent on the acceptor's behalf once a friend request is accepted.
pub const FRIEND_GREETING: &str = "We are friends now, let's start chatting!";

#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Page size when a history request does not name one
    pub history_page_size: u32,
    /// Upper bound on any single history page
    pub history_max_page: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_page_size: 20,
            history_max_page: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FriendAcceptance {
    AlreadyFriends,
    /// `greeting` is `None` if the friendship was stored but the greeting could not be sent
    Accepted { greeting: Option<ChatMessage> },
}

/// Entry point shared by the gateway and the REST handlers.
///
/// Every method is synchronous and may touch SQLite; call from async code via
/// `spawn_blocking`.
#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
    sessions: SessionRegistry,
    pipeline: MessagePipeline,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(db: Arc<Database>, sessions: SessionRegistry, settings: ChatSettings) -> Self {
        let pipeline = MessagePipeline::new(db.clone(), sessions.clone());
        Self {
            db,
            sessions,
            pipeline,
            settings,
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn submit(&self, sender_id: UserId, message: ChatMessage) -> Result<Submitted, ChatError> {
        self.pipeline.submit(sender_id, message)
    }

    pub fn acknowledge(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        last_message_id: MessageId,
    ) -> Result<AckOutcome, ChatError> {
        ack::acknowledge(&self.db, user_id, conversation_id, last_message_id)
    }

    pub fn unread_count(&self, user_id: UserId, conversation_id: ConversationId) -> Result<i64, ChatError> {
        ack::unread_count(&self.db, user_id, conversation_id)
    }

    /// One page of history; `limit` defaults to the configured page size and is
    /// capped at the configured maximum.
    pub fn history(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: Option<u32>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let limit = limit
            .unwrap_or(self.settings.history_page_size)
            .clamp(1, self.settings.history_max_page.max(1));
        history::get_history(&self.db, user_id, conversation_id, before, limit)
    }

    /// `acceptor` accepts the friend request(s) `requester` sent them.
    ///
    /// Marks the requests accepted, records the friendship and greets the
    /// requester through the normal message path. Accepting twice is not an error.
    pub fn accept_friend_request(
        &self,
        acceptor: UserId,
        requester: UserId,
    ) -> Result<FriendAcceptance, ChatError> {
        if acceptor == requester {
            return Err(ChatError::SelfAddressed);
        }
        if self.db.get_user(requester)?.is_none() {
            return Err(ChatError::UserNotFound);
        }
        match friends::accept_friendship(&self.db, requester, acceptor)? {
            FriendshipAcceptance::AlreadyFriends => return Ok(FriendAcceptance::AlreadyFriends),
            FriendshipAcceptance::NoPendingRequest => return Err(ChatError::FriendRequestNotFound),
            FriendshipAcceptance::Accepted => {}
        }

        let greeting = ChatMessage {
            message_id: 0,
            conversation_type: ConversationType::Private,
            conversation_id: None,
            from: acceptor,
            to: requester,
            reply_to: None,
            content: MessageContent::text(FRIEND_GREETING),
            sent_at: None,
        };
        let greeting = match self.pipeline.submit(acceptor, greeting) {
            Ok(sent) => Some(sent.message),
            Err(e) => {
                warn!(
                    "Friendship {} <-> {} stored but greeting failed: {}",
                    acceptor, requester, e
                );
                None
            }
        };

        Ok(FriendAcceptance::Accepted { greeting })
    }

    pub fn delete_friend(&self, user_id: UserId, other: UserId) -> Result<(), ChatError> {
        if !friends::delete_friend(&self.db, user_id, other)? {
            return Err(ChatError::FriendshipNotFound);
        }
        Ok(())
    }

    /// The user's private conversations, most recently active first, with the
    /// peer's profile, a preview of the latest message and the unread count.
    pub fn chat_list(&self, user_id: UserId) -> Result<Vec<ChatListEntry>, ChatError> {
        let conversations = self.db.list_conversations_for_user(user_id)?;
        let mut chats = Vec::with_capacity(conversations.len());

        for row in conversations {
            let Some(peer_id) = conversation::members(&row).other(user_id) else {
                continue;
            };
            let Some(peer) = self.db.get_user(peer_id)? else {
                warn!("Conversation {} references missing user {}", row.id, peer_id);
                continue;
            };

            let last_message_preview = match row.last_message_id {
                Some(id) => self
                    .db
                    .get_message(id)?
                    .filter(|m| !m.is_deleted)
                    .and_then(|m| history::to_chat_message(m).ok())
                    .map(|m| m.content.preview()),
                None => None,
            };

            chats.push(ChatListEntry {
                conversation_type: ConversationType::Private,
                info: PrivateChatSummary {
                    conversation_id: row.id,
                    user_id: peer.id,
                    username: peer.username,
                    nickname: peer.nickname,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                    last_message_preview,
                    unread_count: self.db.count_unread(row.id, user_id)?,
                },
            });
        }

        Ok(chats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;
    use tandem_types::events::ServerEvent;
    use tandem_types::models::FriendRequestContent;

    fn service() -> (ChatService, UserId, UserId, UserId) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ann = db.create_user("ann", "Ann").unwrap();
        let ben = db.create_user("ben", "Ben").unwrap();
        let cat = db.create_user("cat", "Cat").unwrap();
        let chat = ChatService::new(db, SessionRegistry::new(), ChatSettings::default());
        (chat, ann, ben, cat)
    }

    fn message(from: UserId, to: UserId, content: MessageContent) -> ChatMessage {
        ChatMessage {
            message_id: 0,
            conversation_type: ConversationType::Private,
            conversation_id: None,
            from,
            to,
            reply_to: None,
            content,
            sent_at: None,
        }
    }

    fn request(from: UserId, to: UserId) -> ChatMessage {
        message(
            from,
            to,
            MessageContent::FriendRequest(FriendRequestContent {
                message: Some("hi, it's me".into()),
                is_accepted: false,
            }),
        )
    }

    #[test]
    fn accepting_a_request_befriends_and_greets() {
        let (chat, ann, ben, _) = service();
        let (ben_conn, mut ben_rx) = ConnectionHandle::new(8);
        chat.sessions().register(ben, ben_conn);

        let req = chat.submit(ben, request(ben, ann)).unwrap();
        assert!(matches!(ben_rx.try_recv().unwrap(), ServerEvent::Chat(_)));

        let outcome = chat.accept_friend_request(ann, ben).unwrap();
        let greeting = match outcome {
            FriendAcceptance::Accepted { greeting: Some(g) } => g,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(greeting.from, ann);
        assert_eq!(greeting.conversation_id, req.message.conversation_id);
        assert_eq!(ben_rx.try_recv().unwrap(), ServerEvent::Chat(greeting));
        assert!(friends::are_friends(chat.db(), ann, ben).unwrap());

        let stored = chat.db().get_message(req.message.message_id).unwrap().unwrap();
        assert!(stored.content.contains("\"isAccepted\":true"));

        assert_eq!(
            chat.accept_friend_request(ann, ben).unwrap(),
            FriendAcceptance::AlreadyFriends
        );
    }

    #[test]
    fn concurrent_accepts_greet_once() {
        for _ in 0..50 {
            let (chat, ann, ben, _) = service();
            let (ben_conn, mut ben_rx) = ConnectionHandle::new(64);
            chat.submit(ben, request(ben, ann)).unwrap();
            chat.sessions().register(ben, ben_conn);

            let accepted: usize = std::thread::scope(|s| {
                let workers: Vec<_> = (0..8)
                    .map(|_| s.spawn(|| chat.accept_friend_request(ann, ben).unwrap()))
                    .collect();
                workers
                    .into_iter()
                    .map(|w| w.join().unwrap())
                    .filter(|outcome| matches!(outcome, FriendAcceptance::Accepted { .. }))
                    .count()
            });
            assert_eq!(accepted, 1);

            let mut greetings = 0;
            while let Ok(event) = ben_rx.try_recv() {
                if let ServerEvent::Chat(message) = event {
                    assert_eq!(message.content, MessageContent::text(FRIEND_GREETING));
                    greetings += 1;
                }
            }
            assert_eq!(greetings, 1);
        }
    }

    #[test]
    fn accepting_requires_a_pending_request() {
        let (chat, ann, ben, _) = service();
        assert!(matches!(
            chat.accept_friend_request(ann, ben),
            Err(ChatError::FriendRequestNotFound)
        ));
        assert!(matches!(
            chat.accept_friend_request(ann, 999),
            Err(ChatError::UserNotFound)
        ));
    }

    #[test]
    fn chat_list_is_newest_first_with_unread_counts() {
        let (chat, ann, ben, cat) = service();
        friends::add_friend(chat.db(), ann, ben).unwrap();
        friends::add_friend(chat.db(), ann, cat).unwrap();

        chat.submit(ben, message(ben, ann, MessageContent::text("one"))).unwrap();
        chat.submit(ben, message(ben, ann, MessageContent::text("two"))).unwrap();
        let last = chat.submit(cat, message(cat, ann, MessageContent::text("meow"))).unwrap();

        let list = chat.chat_list(ann).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].info.username, "cat");
        assert_eq!(list[0].info.last_message_preview.as_deref(), Some("meow"));
        assert_eq!(list[0].info.unread_count, 1);
        assert_eq!(list[1].info.username, "ben");
        assert_eq!(list[1].info.unread_count, 2);

        let conversation_id = last.message.conversation_id.unwrap();
        chat.acknowledge(ann, conversation_id, last.message.message_id).unwrap();
        assert_eq!(chat.unread_count(ann, conversation_id).unwrap(), 0);

        let ben_view = chat.chat_list(ben).unwrap();
        assert_eq!(ben_view.len(), 1);
        assert_eq!(ben_view[0].info.user_id, ann);
        assert_eq!(ben_view[0].info.unread_count, 0);
    }

    #[test]
    fn history_limit_is_clamped() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ann = db.create_user("ann", "Ann").unwrap();
        let ben = db.create_user("ben", "Ben").unwrap();
        friends::add_friend(&db, ann, ben).unwrap();
        let settings = ChatSettings {
            history_page_size: 2,
            history_max_page: 3,
        };
        let chat = ChatService::new(db, SessionRegistry::new(), settings);

        let mut conversation_id = 0;
        for i in 0..5 {
            let sent = chat
                .submit(ann, message(ann, ben, MessageContent::text(format!("m{i}"))))
                .unwrap();
            conversation_id = sent.message.conversation_id.unwrap();
        }

        assert_eq!(chat.history(ben, conversation_id, None, None).unwrap().len(), 2);
        assert_eq!(chat.history(ben, conversation_id, None, Some(50)).unwrap().len(), 3);
        assert_eq!(chat.history(ben, conversation_id, None, Some(0)).unwrap().len(), 1);
    }
}
