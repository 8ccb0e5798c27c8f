/// Database row types — these map directly to SQLite rows.
/// Distinct from the refind-types API models to keep the DB layer
/// independent of the wire format.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

pub struct ItemRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub date_lost_found: String,
    pub image_url: Option<String>,
    pub item_type: String,
    pub status: String,
    pub user_id: String,
    pub created_at: String,
    /// Joined from users; "unknown" if the owner row is gone.
    pub owner_full_name: String,
    pub owner_avatar_url: Option<String>,
}

/// A conversation joined with both participant profiles and the item title,
/// which is what every caller needs (identity resolution, list rendering).
pub struct ConversationRow {
    pub id: String,
    pub item_id: String,
    pub item_title: String,
    pub user1_id: String,
    pub user1_name: String,
    pub user1_avatar: Option<String>,
    pub user2_id: String,
    pub user2_name: String,
    pub user2_avatar: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
}
