use crate::Database;
use crate::models::{GameRow, MessageRow, PostRow, ReplyRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password) VALUES (?1, ?2, ?3)",
                (username, email, password_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT * FROM users WHERE email = ?1", email)
        })
    }

    /// Case-insensitive lookup, matching how profile URLs are typed by hand.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT * FROM users WHERE LOWER(username) = LOWER(?1)",
                username,
            )
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM users WHERE id = ?1")?;
            let row = stmt.query_row([id], map_user).optional()?;
            Ok(row)
        })
    }

    pub fn email_or_username_taken(&self, email: &str, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM users WHERE email = ?1 OR username = ?2")?;
            let row: Option<i64> = stmt.query_row((email, username), |row| row.get(0)).optional()?;
            Ok(row.is_some())
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM users ORDER BY id")?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the number of rows changed; 0 means the old username is unknown.
    pub fn update_username(&self, old_username: &str, new_username: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET username = ?1 WHERE username = ?2",
                (new_username, old_username),
            )?;
            Ok(changed)
        })
    }

    pub fn update_profile_pic(&self, username: &str, profile_pic: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET profile_pic = ?1 WHERE username = ?2",
                (profile_pic, username),
            )?;
            Ok(changed)
        })
    }

    /// Absent fields keep their stored value.
    pub fn update_preferences(
        &self,
        username: &str,
        platforms: Option<&str>,
        genres: Option<&str>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET platforms = COALESCE(?1, platforms),
                     genres = COALESCE(?2, genres)
                 WHERE username = ?3",
                (platforms, genres, username),
            )?;
            Ok(changed)
        })
    }

    // -- Friends --

    /// Adding an existing friend is a no-op.
    pub fn add_friend(&self, user_id: i64, friend_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?1, ?2)",
                (user_id, friend_id),
            )?;
            Ok(())
        })
    }

    pub fn list_friends(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.* FROM friends f
                 JOIN users u ON f.friend_id = u.id
                 WHERE f.user_id = ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([user_id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_friend_profile(&self, user_id: i64, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.* FROM friends f
                 JOIN users u ON f.friend_id = u.id
                 WHERE f.user_id = ?1 AND LOWER(u.username) = LOWER(?2)",
            )?;
            let row = stmt.query_row((user_id, username), map_user).optional()?;
            Ok(row)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, sender_id: i64, recipient_id: i64, body: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, recipient_id, body) VALUES (?1, ?2, ?3)",
                (sender_id, recipient_id, body),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Both directions of a two-party conversation, newest first.
    pub fn conversation(&self, user_id: i64, other_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, su.username, m.recipient_id, ru.username,
                        m.body, m.created_at
                 FROM messages m
                 JOIN users su ON m.sender_id = su.id
                 JOIN users ru ON m.recipient_id = ru.id
                 WHERE (m.sender_id = ?1 AND m.recipient_id = ?2)
                    OR (m.sender_id = ?2 AND m.recipient_id = ?1)
                 ORDER BY m.created_at DESC, m.id DESC",
            )?;
            let rows = stmt
                .query_map((user_id, other_id), |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        sender_username: row.get(2)?,
                        recipient_id: row.get(3)?,
                        recipient_username: row.get(4)?,
                        body: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Posts --

    pub fn insert_post(
        &self,
        user_id: i64,
        game_id: i64,
        game_name: &str,
        content: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (user_id, game_id, game_name, content) VALUES (?1, ?2, ?3, ?4)",
                (user_id, game_id, game_name, content),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{POST_SELECT} WHERE p.id = ?1"))?;
            let row = stmt.query_row([id], map_post).optional()?;
            Ok(row)
        })
    }

    pub fn list_posts(&self) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{POST_SELECT} ORDER BY p.created_at DESC, p.id DESC"))?;
            let rows = stmt
                .query_map([], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Replies --

    pub fn insert_reply(&self, post_id: i64, user_id: i64, content: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO replies (post_id, user_id, content) VALUES (?1, ?2, ?3)",
                (post_id, user_id, content),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_reply(&self, id: i64) -> Result<Option<ReplyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{REPLY_SELECT} WHERE r.id = ?1"))?;
            let row = stmt.query_row([id], map_reply).optional()?;
            Ok(row)
        })
    }

    pub fn replies_for_post(&self, post_id: i64) -> Result<Vec<ReplyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{REPLY_SELECT} WHERE r.post_id = ?1 ORDER BY r.created_at, r.id"
            ))?;
            let rows = stmt
                .query_map([post_id], map_reply)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch replies for a set of post ids.
    pub fn replies_for_posts(&self, post_ids: &[i64]) -> Result<Vec<ReplyRow>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=post_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "{REPLY_SELECT} WHERE r.post_id IN ({}) ORDER BY r.created_at, r.id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = post_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), map_reply)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Games --

    pub fn get_game(&self, id: i64) -> Result<Option<GameRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM games WHERE id = ?1")?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(GameRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn cache_game(&self, id: i64, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO games (id, name) VALUES (?1, ?2)",
                (id, name),
            )?;
            Ok(())
        })
    }

    // -- Health --

    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }
}

const POST_SELECT: &str = "SELECT p.id, p.user_id, u.username, u.profile_pic,
        p.game_id, p.game_name, p.content, p.created_at
 FROM posts p
 JOIN users u ON p.user_id = u.id";

const REPLY_SELECT: &str = "SELECT r.id, r.post_id, u.username, r.content, r.created_at
 FROM replies r
 JOIN users u ON r.user_id = u.id";

fn query_user(conn: &Connection, sql: &str, param: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let row = stmt.query_row([param], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password: row.get("password")?,
        profile_pic: row.get("profile_pic")?,
        banner: row.get("banner")?,
        platforms: row.get("platforms")?,
        genres: row.get("genres")?,
        created_at: row.get("created_at")?,
    })
}

fn map_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        profile_pic: row.get(3)?,
        game_id: row.get(4)?,
        game_name: row.get(5)?,
        content: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_reply(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReplyRow> {
    Ok(ReplyRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        username: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users(usernames: &[&str]) -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let ids = usernames
            .iter()
            .map(|name| {
                db.create_user(name, &format!("{name}@example.com"), "hash")
                    .unwrap()
            })
            .collect();
        (db, ids)
    }

    #[test]
    fn duplicate_username_rejected() {
        let (db, _) = db_with_users(&["riley"]);
        assert!(db.create_user("riley", "other@example.com", "hash").is_err());
        assert!(db.email_or_username_taken("riley@example.com", "someone").unwrap());
        assert!(!db.email_or_username_taken("new@example.com", "someone").unwrap());
    }

    #[test]
    fn username_lookup_is_case_insensitive() {
        let (db, ids) = db_with_users(&["Riley"]);
        let user = db.get_user_by_username("rIlEy").unwrap().unwrap();
        assert_eq!(user.id, ids[0]);
    }

    #[test]
    fn add_friend_is_idempotent() {
        let (db, ids) = db_with_users(&["ana", "ben"]);
        db.add_friend(ids[0], ids[1]).unwrap();
        db.add_friend(ids[0], ids[1]).unwrap();

        let friends = db.list_friends(ids[0]).unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].username, "ben");

        // Friendship is directional; ben has not added ana back.
        assert!(db.list_friends(ids[1]).unwrap().is_empty());
    }

    #[test]
    fn friend_profile_requires_friendship() {
        let (db, ids) = db_with_users(&["ana", "ben"]);
        assert!(db.get_friend_profile(ids[0], "ben").unwrap().is_none());

        db.add_friend(ids[0], ids[1]).unwrap();
        let profile = db.get_friend_profile(ids[0], "ben").unwrap().unwrap();
        assert_eq!(profile.id, ids[1]);
    }

    #[test]
    fn conversation_covers_both_directions_only() {
        let (db, ids) = db_with_users(&["ana", "ben", "cam"]);
        db.insert_message(ids[0], ids[1], "hey ben").unwrap();
        db.insert_message(ids[1], ids[0], "hey ana").unwrap();
        db.insert_message(ids[2], ids[0], "unrelated").unwrap();

        let convo = db.conversation(ids[0], ids[1]).unwrap();
        assert_eq!(convo.len(), 2);
        assert!(convo.iter().all(|m| m.body != "unrelated"));
        // Newest first.
        assert_eq!(convo[0].body, "hey ana");
        assert_eq!(convo[0].sender_username, "ben");
    }

    #[test]
    fn posts_join_current_username() {
        let (db, ids) = db_with_users(&["ana"]);
        db.insert_post(ids[0], 42, "Outer Wilds", "so good").unwrap();

        db.update_username("ana", "ana2").unwrap();
        let posts = db.list_posts().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].username, "ana2");
        assert_eq!(posts[0].game_name, "Outer Wilds");
    }

    #[test]
    fn replies_batch_fetch() {
        let (db, ids) = db_with_users(&["ana", "ben"]);
        let p1 = db.insert_post(ids[0], 1, "Hades", "roguelike night").unwrap();
        let p2 = db.insert_post(ids[1], 2, "Celeste", "climbing again").unwrap();
        let p3 = db.insert_post(ids[0], 3, "Tunic", "fox time").unwrap();

        db.insert_reply(p1, ids[1], "count me in").unwrap();
        db.insert_reply(p1, ids[0], "see you there").unwrap();
        db.insert_reply(p2, ids[0], "b-side?").unwrap();

        let replies = db.replies_for_posts(&[p1, p2, p3]).unwrap();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies.iter().filter(|r| r.post_id == p1).count(), 2);
        assert_eq!(replies.iter().filter(|r| r.post_id == p3).count(), 0);

        assert!(db.replies_for_posts(&[]).unwrap().is_empty());
    }

    #[test]
    fn preferences_keep_absent_fields() {
        let (db, _) = db_with_users(&["ana"]);
        db.update_preferences("ana", Some(r#"["pc","switch"]"#), None)
            .unwrap();
        db.update_preferences("ana", None, Some(r#"["rpg"]"#)).unwrap();

        let user = db.get_user_by_username("ana").unwrap().unwrap();
        assert_eq!(user.platforms, r#"["pc","switch"]"#);
        assert_eq!(user.genres, r#"["rpg"]"#);

        // Unknown user changes nothing.
        assert_eq!(db.update_preferences("ghost", None, None).unwrap(), 0);
    }

    #[test]
    fn game_cache_first_write_wins() {
        let (db, _) = db_with_users(&[]);
        assert!(db.get_game(7).unwrap().is_none());
        db.cache_game(7, "Hollow Knight").unwrap();
        db.cache_game(7, "Renamed").unwrap();
        assert_eq!(db.get_game(7).unwrap().unwrap().name, "Hollow Knight");
    }
}
