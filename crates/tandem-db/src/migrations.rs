use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            nickname    TEXT NOT NULL,
            role        INTEGER NOT NULL DEFAULT 0,
            ban_until   TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One row per unordered pair: members are stored low/high
        CREATE TABLE IF NOT EXISTS conversations (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            member_low      INTEGER NOT NULL REFERENCES users(id),
            member_high     INTEGER NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            last_message_id INTEGER,
            UNIQUE(member_low, member_high),
            CHECK(member_low < member_high)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_high
            ON conversations(member_high);

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id),
            sender_id       INTEGER NOT NULL REFERENCES users(id),
            receiver_id     INTEGER NOT NULL REFERENCES users(id),
            content_type    INTEGER NOT NULL,
            content         TEXT NOT NULL,
            reply_to        INTEGER,
            sent_at         TEXT NOT NULL,
            is_deleted      INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, id);

        CREATE INDEX IF NOT EXISTS idx_messages_sender_receiver
            ON messages(sender_id, receiver_id, content_type);

        CREATE TABLE IF NOT EXISTS friends (
            user_low    INTEGER NOT NULL REFERENCES users(id),
            user_high   INTEGER NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL,
            PRIMARY KEY(user_low, user_high),
            CHECK(user_low < user_high)
        );

        CREATE TABLE IF NOT EXISTS read_acks (
            conversation_id      INTEGER NOT NULL REFERENCES conversations(id),
            user_id              INTEGER NOT NULL REFERENCES users(id),
            last_read_message_id INTEGER NOT NULL REFERENCES messages(id),
            PRIMARY KEY(conversation_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
