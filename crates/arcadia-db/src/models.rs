/// Database row types — these map directly to SQLite rows.
/// Distinct from arcadia-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub profile_pic: String,
    pub banner: String,
    pub platforms: String,
    pub genres: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub recipient_id: i64,
    pub recipient_username: String,
    pub body: String,
    pub created_at: String,
}

pub struct PostRow {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub profile_pic: String,
    pub game_id: i64,
    pub game_name: String,
    pub content: String,
    pub created_at: String,
}

pub struct ReplyRow {
    pub id: i64,
    pub post_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: String,
}

pub struct GameRow {
    pub id: i64,
    pub name: String,
}
