use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            full_name   TEXT NOT NULL,
            avatar_url  TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS items (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL,
            category        TEXT NOT NULL,
            location        TEXT NOT NULL,
            latitude        REAL,
            longitude       REAL,
            date_lost_found TEXT NOT NULL,
            image_url       TEXT,
            item_type       TEXT NOT NULL CHECK (item_type IN ('lost', 'found')),
            status          TEXT NOT NULL DEFAULT 'active'
                                CHECK (status IN ('active', 'resolved')),
            user_id         TEXT NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_items_created
            ON items(created_at);

        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            item_id     TEXT NOT NULL REFERENCES items(id),
            user1_id    TEXT NOT NULL REFERENCES users(id),
            user2_id    TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            CHECK (user1_id <> user2_id)
        );

        -- At most one conversation per item per unordered participant pair.
        -- Concurrent first-contact races resolve here: the loser's INSERT
        -- fails with a constraint violation and rereads the winner's row.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_item_pair
            ON conversations(item_id,
                             min(user1_id, user2_id),
                             max(user1_id, user2_id));

        CREATE INDEX IF NOT EXISTS idx_conversations_user1
            ON conversations(user1_id, updated_at);
        CREATE INDEX IF NOT EXISTS idx_conversations_user2
            ON conversations(user2_id, updated_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
