use crate::models::{ConversationRow, ItemRow, MessageRow, UserRow};
use crate::{Database, timestamp_now};
use anyhow::{Result, anyhow};
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        full_name: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, full_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, email, password_hash, full_name, timestamp_now()],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Items --

    #[allow(clippy::too_many_arguments)]
    pub fn insert_item(
        &self,
        id: &str,
        title: &str,
        description: &str,
        category: &str,
        location: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
        date_lost_found: &str,
        image_url: Option<&str>,
        item_type: &str,
        user_id: &str,
    ) -> Result<String> {
        self.with_conn(|conn| {
            let created_at = timestamp_now();
            conn.execute(
                "INSERT INTO items
                    (id, title, description, category, location, latitude, longitude,
                     date_lost_found, image_url, item_type, status, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'active', ?11, ?12)",
                rusqlite::params![
                    id,
                    title,
                    description,
                    category,
                    location,
                    latitude,
                    longitude,
                    date_lost_found,
                    image_url,
                    item_type,
                    user_id,
                    created_at
                ],
            )?;
            Ok(created_at)
        })
    }

    /// Full feed, newest first. Unpaginated — the expected item-set size is
    /// hundreds, and filtering happens over the full set.
    pub fn get_items(&self) -> Result<Vec<ItemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{ITEM_SELECT} ORDER BY i.created_at DESC"
            ))?;
            let rows = stmt
                .query_map([], item_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_item(&self, id: &str) -> Result<Option<ItemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{ITEM_SELECT} WHERE i.id = ?1"))?;
            let row = stmt.query_row([id], item_from_row).optional()?;
            Ok(row)
        })
    }

    // -- Conversations --

    /// Find-or-create the conversation for (item, unordered user pair).
    ///
    /// `new_id` is the id to use if a row has to be created; the returned id
    /// is the surviving conversation either way. Two concurrent calls both
    /// observing "not found" converge through the unique index on
    /// (item_id, min(pair), max(pair)): the second INSERT conflicts and the
    /// loser rereads the winner's row instead of duplicating it.
    pub fn get_or_create_conversation(
        &self,
        new_id: &str,
        item_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<String> {
        self.with_conn(|conn| {
            if let Some(existing) = query_conversation_id_for_pair(conn, item_id, user_a, user_b)? {
                return Ok(existing);
            }

            let now = timestamp_now();
            let inserted = conn.execute(
                "INSERT INTO conversations (id, item_id, user1_id, user2_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![new_id, item_id, user_a, user_b, now],
            );

            match inserted {
                Ok(_) => Ok(new_id.to_string()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    // Lost the race: someone else created it between our
                    // read and our insert. Reread and return theirs.
                    query_conversation_id_for_pair(conn, item_id, user_a, user_b)?.ok_or_else(
                        || anyhow!("conversation insert conflicted but no surviving row found"),
                    )
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{CONVERSATION_SELECT} WHERE c.id = ?1"))?;
            let row = stmt.query_row([id], conversation_from_row).optional()?;
            Ok(row)
        })
    }

    /// All conversations the user participates in, most recently updated
    /// first.
    pub fn get_conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{CONVERSATION_SELECT}
                 WHERE c.user1_id = ?1 OR c.user2_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message. Empty or whitespace-only content is a no-op and
    /// returns `None` — nothing is persisted and no error is raised.
    ///
    /// Bumps the conversation's updated_at so the conversation list sorts
    /// by latest activity.
    pub fn append_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Option<MessageRow>> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        self.with_conn(|conn| {
            let created_at = timestamp_now();

            // One transaction: the message row and the conversation's
            // activity bump land together or not at all.
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, conversation_id, sender_id, content, created_at],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![created_at, conversation_id],
            )?;
            tx.commit()?;

            Ok(Some(MessageRow {
                id: id.to_string(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.to_string(),
                content: content.to_string(),
                created_at,
            }))
        })
    }

    /// Full message history, oldest first. Row id breaks creation-time ties
    /// so the order is stable across reads.
    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const ITEM_SELECT: &str = "
    SELECT i.id, i.title, i.description, i.category, i.location,
           i.latitude, i.longitude, i.date_lost_found, i.image_url,
           i.item_type, i.status, i.user_id, i.created_at,
           u.full_name, u.avatar_url
    FROM items i
    LEFT JOIN users u ON i.user_id = u.id";

fn item_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<ItemRow, rusqlite::Error> {
    Ok(ItemRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        location: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        date_lost_found: row.get(7)?,
        image_url: row.get(8)?,
        item_type: row.get(9)?,
        status: row.get(10)?,
        user_id: row.get(11)?,
        created_at: row.get(12)?,
        owner_full_name: row
            .get::<_, Option<String>>(13)?
            .unwrap_or_else(|| "unknown".to_string()),
        owner_avatar_url: row.get(14)?,
    })
}

const CONVERSATION_SELECT: &str = "
    SELECT c.id, c.item_id, i.title,
           c.user1_id, u1.full_name, u1.avatar_url,
           c.user2_id, u2.full_name, u2.avatar_url,
           c.created_at, c.updated_at
    FROM conversations c
    LEFT JOIN items i ON c.item_id = i.id
    LEFT JOIN users u1 ON c.user1_id = u1.id
    LEFT JOIN users u2 ON c.user2_id = u2.id";

fn conversation_from_row(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<ConversationRow, rusqlite::Error> {
    Ok(ConversationRow {
        id: row.get(0)?,
        item_id: row.get(1)?,
        item_title: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        user1_id: row.get(3)?,
        user1_name: row
            .get::<_, Option<String>>(4)?
            .unwrap_or_else(|| "unknown".to_string()),
        user1_avatar: row.get(5)?,
        user2_id: row.get(6)?,
        user2_name: row
            .get::<_, Option<String>>(7)?
            .unwrap_or_else(|| "unknown".to_string()),
        user2_avatar: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, email, password, full_name, avatar_url, created_at
         FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                full_name: row.get(3)?,
                avatar_url: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Match the unordered pair in either slot order — either user may have
/// been user1 or user2 when the row was created.
fn query_conversation_id_for_pair(
    conn: &Connection,
    item_id: &str,
    user_a: &str,
    user_b: &str,
) -> Result<Option<String>> {
    let row = conn
        .query_row(
            "SELECT id FROM conversations
             WHERE item_id = ?1
               AND ((user1_id = ?2 AND user2_id = ?3)
                 OR (user1_id = ?3 AND user2_id = ?2))",
            rusqlite::params![item_id, user_a, user_b],
            |row| row.get(0),
        )
        .optional()?;

    Ok(row)
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

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn setup() -> (Database, String, String, String) {
        let db = Database::open_in_memory().unwrap();

        let alice = Uuid::new_v4().to_string();
        let bob = Uuid::new_v4().to_string();
        db.create_user(&alice, "alice@campus.edu", "hash-a", "Alice Smith")
            .unwrap();
        db.create_user(&bob, "bob@campus.edu", "hash-b", "Bob Jones")
            .unwrap();

        let item = Uuid::new_v4().to_string();
        db.insert_item(
            &item,
            "Blue Hydro Flask",
            "32oz, blue with stickers",
            "Accessories",
            "Library",
            None,
            None,
            "2023-10-25",
            None,
            "lost",
            &alice,
        )
        .unwrap();

        (db, alice, bob, item)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (db, alice, bob, item) = setup();

        let first = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &bob, &alice)
            .unwrap();
        let second = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &bob, &alice)
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn pair_matches_regardless_of_slot_order() {
        let (db, alice, bob, item) = setup();

        let created = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &bob, &alice)
            .unwrap();
        // Same pair, opposite order — must reuse, not duplicate
        let reused = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &alice, &bob)
            .unwrap();

        assert_eq!(created, reused);
    }

    #[test]
    fn unique_index_collapses_racing_inserts() {
        let (db, alice, bob, item) = setup();

        let winner = Uuid::new_v4().to_string();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, item_id, user1_id, user2_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![winner, item, bob, alice, timestamp_now()],
            )?;
            Ok(())
        })
        .unwrap();

        // Simulate the loser of a concurrent first-contact race: its read
        // saw no row, its insert (opposite slot order) must conflict and
        // converge on the winner's id.
        let loser_insert = db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, item_id, user1_id, user2_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![Uuid::new_v4().to_string(), item, alice, bob, timestamp_now()],
            )?;
            Ok(())
        });
        assert!(loser_insert.is_err());

        let resolved = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &alice, &bob)
            .unwrap();
        assert_eq!(resolved, winner);
    }

    #[test]
    fn same_pair_on_another_item_is_a_new_conversation() {
        let (db, alice, bob, item) = setup();

        let other_item = Uuid::new_v4().to_string();
        db.insert_item(
            &other_item,
            "Black Umbrella",
            "Left on table 5",
            "Accessories",
            "Cafeteria",
            None,
            None,
            "2023-10-26",
            None,
            "found",
            &alice,
        )
        .unwrap();

        let first = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &bob, &alice)
            .unwrap();
        let second = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &other_item, &bob, &alice)
            .unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn blank_message_is_a_no_op() {
        let (db, alice, bob, item) = setup();
        let conv = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &bob, &alice)
            .unwrap();

        let empty = db
            .append_message(&Uuid::new_v4().to_string(), &conv, &bob, "")
            .unwrap();
        assert!(empty.is_none());

        let whitespace = db
            .append_message(&Uuid::new_v4().to_string(), &conv, &bob, "   ")
            .unwrap();
        assert!(whitespace.is_none());

        assert!(db.get_messages(&conv).unwrap().is_empty());
    }

    #[test]
    fn messages_list_in_non_decreasing_creation_order() {
        let (db, alice, bob, item) = setup();
        let conv = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &bob, &alice)
            .unwrap();

        for text in ["first", "second", "third"] {
            db.append_message(&Uuid::new_v4().to_string(), &conv, &bob, text)
                .unwrap()
                .unwrap();
        }

        let messages = db.get_messages(&conv).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[2].content, "third");
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn failed_append_leaves_no_partial_state() {
        let (db, alice, bob, item) = setup();
        let conv = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &bob, &alice)
            .unwrap();
        let before = db.get_conversation(&conv).unwrap().unwrap().updated_at;

        // Unknown sender trips the foreign key; the whole append must roll
        // back, leaving neither a message row nor a bumped updated_at.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let result = db.append_message(
            &Uuid::new_v4().to_string(),
            &conv,
            &Uuid::new_v4().to_string(),
            "hello",
        );
        assert!(result.is_err());

        assert!(db.get_messages(&conv).unwrap().is_empty());
        let after = db.get_conversation(&conv).unwrap().unwrap().updated_at;
        assert_eq!(after, before);
    }

    #[test]
    fn append_bumps_conversation_updated_at() {
        let (db, alice, bob, item) = setup();
        let conv = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &bob, &alice)
            .unwrap();

        let before = db.get_conversation(&conv).unwrap().unwrap().updated_at;
        let row = db
            .append_message(&Uuid::new_v4().to_string(), &conv, &bob, "hello")
            .unwrap()
            .unwrap();
        let after = db.get_conversation(&conv).unwrap().unwrap().updated_at;

        assert_eq!(after, row.created_at);
        assert!(after >= before);
    }

    #[test]
    fn conversation_list_orders_by_latest_activity() {
        let (db, alice, bob, item) = setup();

        let carol = Uuid::new_v4().to_string();
        db.create_user(&carol, "carol@campus.edu", "hash-c", "Carol Reyes")
            .unwrap();

        let with_bob = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &bob, &alice)
            .unwrap();
        let with_carol = db
            .get_or_create_conversation(&Uuid::new_v4().to_string(), &item, &carol, &alice)
            .unwrap();

        // Activity in the older conversation moves it back to the front.
        // Sleep past the millisecond timestamp resolution first.
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.append_message(&Uuid::new_v4().to_string(), &with_bob, &bob, "ping")
            .unwrap()
            .unwrap();

        let list = db.get_conversations_for_user(&alice).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, with_bob);
        assert_eq!(list[1].id, with_carol);
    }

    #[test]
    fn item_detail_carries_owner_profile() {
        let (db, alice, _bob, item) = setup();

        let row = db.get_item(&item).unwrap().unwrap();
        assert_eq!(row.user_id, alice);
        assert_eq!(row.owner_full_name, "Alice Smith");
        assert!(db.get_item(&Uuid::new_v4().to_string()).unwrap().is_none());
    }

    #[test]
    fn feed_lists_newest_first() {
        let (db, alice, _bob, _item) = setup();

        db.insert_item(
            &Uuid::new_v4().to_string(),
            "Calculus Textbook",
            "Found on a bench",
            "Books",
            "Science Building",
            None,
            None,
            "2023-10-26",
            None,
            "found",
            &alice,
        )
        .unwrap();

        let items = db.get_items().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].created_at >= items[1].created_at);
    }
}
