use crate::models::{ConversationRow, FriendshipAcceptance, MessageRow, NewMessage, UserRow};
use crate::Database;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tandem_types::models::{ContentType, UserPair};

const CONVERSATION_COLUMNS: &str =
    "id, member_low, member_high, created_at, updated_at, last_message_id";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, receiver_id, content_type, content, reply_to, sent_at, is_deleted";

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, nickname: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, nickname) VALUES (?1, ?2)",
                (username, nickname),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, nickname, role, ban_until FROM users WHERE id = ?1",
                [id],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        nickname: row.get(2)?,
                        role: row.get(3)?,
                        ban_until: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Conversations --

    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                [id],
                map_conversation,
            )
            .optional()
        })
    }

    pub fn find_conversation(&self, pair: UserPair) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation_by_pair(conn, pair))
    }

    /// Insert-or-fetch the conversation for `pair`.
    /// Returns the row and whether this call created it.
    pub fn get_or_create_conversation(
        &self,
        pair: UserPair,
        now: DateTime<Utc>,
    ) -> Result<(ConversationRow, bool)> {
        self.with_conn(|conn| {
            // UNIQUE(member_low, member_high) makes racing first contacts collapse into one row
            let inserted = conn.execute(
                "INSERT INTO conversations (member_low, member_high, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT (member_low, member_high) DO NOTHING",
                rusqlite::params![pair.low(), pair.high(), now],
            )?;

            let row = query_conversation_by_pair(conn, pair)?.ok_or_else(|| {
                anyhow!("conversation {}/{} missing after insert", pair.low(), pair.high())
            })?;

            Ok((row, inserted == 1))
        })
    }

    /// All conversations `user_id` takes part in, most recently active first.
    pub fn list_conversations_for_user(&self, user_id: i64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE member_low = ?1 OR member_high = ?1
                 ORDER BY updated_at DESC, id DESC"
            ))?;

            let rows = stmt
                .query_map([user_id], map_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    /// Store a message and point its conversation at it, in one transaction.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages
                    (conversation_id, sender_id, receiver_id, content_type, content, reply_to, sent_at, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                rusqlite::params![
                    msg.conversation_id,
                    msg.sender_id,
                    msg.receiver_id,
                    msg.content_type,
                    msg.content,
                    msg.reply_to,
                    msg.sent_at,
                ],
            )?;
            let id = tx.last_insert_rowid();

            let touched = tx.execute(
                "UPDATE conversations SET last_message_id = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![id, msg.sent_at, msg.conversation_id],
            )?;
            if touched != 1 {
                // Dropping `tx` rolls the insert back
                return Err(anyhow!(
                    "conversation {} not updated for message {}",
                    msg.conversation_id,
                    id
                ));
            }

            tx.commit()?;

            Ok(MessageRow {
                id,
                conversation_id: msg.conversation_id,
                sender_id: msg.sender_id,
                receiver_id: msg.receiver_id,
                content_type: msg.content_type,
                content: msg.content.to_string(),
                reply_to: msg.reply_to,
                sent_at: msg.sent_at,
                is_deleted: false,
            })
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [id],
                map_message,
            )
            .optional()
        })
    }

    /// Newest-first page of live messages with `id < before` (or from the top when `None`).
    pub fn get_messages_before(
        &self,
        conversation_id: i64,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                   AND is_deleted = 0
                   AND (?2 IS NULL OR id < ?2)
                 ORDER BY id DESC
                 LIMIT ?3"
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![conversation_id, before, limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn soft_delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0",
                [id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Set `isAccepted` on every live friend request from `sender_id` to `receiver_id`.
    /// Returns how many requests were found.
    pub fn mark_friend_requests_accepted(&self, sender_id: i64, receiver_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages
                 SET content = json_set(content, '$.isAccepted', json('true'))
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND content_type = ?3 AND is_deleted = 0",
                rusqlite::params![sender_id, receiver_id, ContentType::FriendRequest.code()],
            )?;
            Ok(changed)
        })
    }

    // -- Friends --

    /// Sweep the requests `requester` sent `acceptor` and insert the friend row,
    /// in one transaction. Of several concurrent callers exactly one sees `Accepted`.
    pub fn accept_friendship(
        &self,
        requester: i64,
        acceptor: i64,
        now: DateTime<Utc>,
    ) -> Result<FriendshipAcceptance> {
        let pair = UserPair::new(requester, acceptor);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let already = tx
                .query_row(
                    "SELECT 1 FROM friends WHERE user_low = ?1 AND user_high = ?2",
                    [pair.low(), pair.high()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .is_some();
            if already {
                return Ok(FriendshipAcceptance::AlreadyFriends);
            }

            let swept = tx.execute(
                "UPDATE messages
                 SET content = json_set(content, '$.isAccepted', json('true'))
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND content_type = ?3 AND is_deleted = 0",
                rusqlite::params![requester, acceptor, ContentType::FriendRequest.code()],
            )?;
            if swept == 0 {
                return Ok(FriendshipAcceptance::NoPendingRequest);
            }

            let inserted = tx.execute(
                "INSERT INTO friends (user_low, user_high, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_low, user_high) DO NOTHING",
                rusqlite::params![pair.low(), pair.high(), now],
            )?;
            if inserted != 1 {
                // Dropping `tx` rolls the sweep back
                return Ok(FriendshipAcceptance::AlreadyFriends);
            }

            tx.commit()?;
            Ok(FriendshipAcceptance::Accepted)
        })
    }

    pub fn friends_exist(&self, pair: UserPair) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM friends WHERE user_low = ?1 AND user_high = ?2",
                    [pair.low(), pair.high()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Returns false when the pair was already present.
    pub fn insert_friend(&self, pair: UserPair, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO friends (user_low, user_high, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_low, user_high) DO NOTHING",
                rusqlite::params![pair.low(), pair.high(), now],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn delete_friend(&self, pair: UserPair) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM friends WHERE user_low = ?1 AND user_high = ?2",
                [pair.low(), pair.high()],
            )?;
            Ok(removed == 1)
        })
    }

    // -- Read acknowledgments --

    /// Insert or raise the read marker. Never lowers it.
    /// Returns true when a row was created or advanced.
    pub fn upsert_read_ack(
        &self,
        conversation_id: i64,
        user_id: i64,
        last_read_message_id: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT INTO read_acks (conversation_id, user_id, last_read_message_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (conversation_id, user_id) DO UPDATE
                     SET last_read_message_id = excluded.last_read_message_id
                     WHERE excluded.last_read_message_id > read_acks.last_read_message_id",
                [conversation_id, user_id, last_read_message_id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn get_read_ack(&self, conversation_id: i64, user_id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT last_read_message_id FROM read_acks WHERE conversation_id = ?1 AND user_id = ?2",
                [conversation_id, user_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Live messages addressed to `user_id` above their read marker.
    pub fn count_unread(&self, conversation_id: i64, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE conversation_id = ?1
                   AND receiver_id = ?2
                   AND is_deleted = 0
                   AND id > COALESCE(
                       (SELECT last_read_message_id FROM read_acks
                        WHERE conversation_id = ?1 AND user_id = ?2),
                       0)",
                [conversation_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn query_conversation_by_pair(conn: &Connection, pair: UserPair) -> Result<Option<ConversationRow>> {
    conn.query_row(
        &format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE member_low = ?1 AND member_high = ?2"
        ),
        [pair.low(), pair.high()],
        map_conversation,
    )
    .optional()
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        member_low: row.get(1)?,
        member_high: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        last_message_id: row.get(5)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        content_type: row.get(4)?,
        content: row.get(5)?,
        reply_to: row.get(6)?,
        sent_at: row.get(7)?,
        is_deleted: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
