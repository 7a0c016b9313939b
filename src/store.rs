//! Relational state: users, posts, provenance records and activities.
//!
//! One SQLite connection per store. Cross-request correctness hangs on two
//! unique constraints: `dmm.hash_value` (first writer wins on identical
//! content) and `users.username` / `users.email` (signup race). The ingest
//! decider treats a hash-value violation as a signal, not a failure, so
//! [`Store::insert_provenance`] surfaces it as a distinct outcome.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::keyvault::EncryptedUserKey;
use crate::{now_s, validate_username, MediaType, ProvenanceId, WARNING_LIMIT};

// -------------------- Rows --------------------

#[derive(Clone, Debug)]
pub struct User {
    pub user_id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub security_key: EncryptedUserKey,
    pub profile_picture: String,
    pub bio: String,
    pub warning: u32,
    pub created_at: i64,
    pub following_count: i64,
    pub followers_count: i64,
}

impl User {
    pub fn is_locked_out(&self) -> bool {
        self.warning >= WARNING_LIMIT
    }
}

#[derive(Clone, Debug)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub media_url: String,
    pub caption: String,
    pub likes_count: i64,
    pub media_type: MediaType,
    pub created_at: i64,
}

#[derive(Clone, Debug)]
pub struct ProvenanceRecord {
    pub provenance_id: ProvenanceId,
    pub post_id: i64,
    pub content_hash: String,
    pub created_at: i64,
}

#[derive(Clone, Debug)]
pub struct Activity {
    pub id: i64,
    pub receiver_name: String,
    pub sender_name: Option<String>,
    pub media_type: String,
    pub liked_post_id: Option<i64>,
    pub liked_post_url: Option<String>,
    pub liked_user_profile_picture: Option<String>,
    pub followed_profile_picture: Option<String>,
    pub detected_post_id: Option<i64>,
    pub detected_post_url: Option<String>,
    pub detected_user_profile_picture: Option<String>,
    pub created_at: i64,
}

/// Outcome of a provenance insert. A duplicate content hash is the
/// decider's theft/duplicate signal; every other failure is fatal.
#[derive(Debug, PartialEq, Eq)]
pub enum ProvenanceInsert {
    Inserted,
    DuplicateHash,
}

/// A provenance record joined with its post and owning user.
pub struct ProvenanceOwner {
    pub record: ProvenanceRecord,
    pub post: Post,
    pub owner: User,
}

// -------------------- Store --------------------

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = if db_path.starts_with("file:") {
            Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )?
        } else {
            Connection::open(db_path)?
        };
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS users (
              user_id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              username TEXT NOT NULL UNIQUE,
              email TEXT NOT NULL UNIQUE,
              password_hash TEXT NOT NULL,
              security_key TEXT NOT NULL,
              profile_picture TEXT NOT NULL DEFAULT 'user_default',
              bio TEXT NOT NULL DEFAULT '',
              warning INTEGER NOT NULL DEFAULT 0 CHECK (warning <= 3),
              created_at INTEGER NOT NULL,
              following_count INTEGER NOT NULL DEFAULT 0,
              followers_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS posts (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              user_id INTEGER NOT NULL REFERENCES users(user_id),
              media_url TEXT NOT NULL UNIQUE,
              caption TEXT NOT NULL DEFAULT '',
              likes_count INTEGER NOT NULL DEFAULT 0,
              media_type TEXT NOT NULL CHECK (media_type IN ('image', 'video')),
              created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS dmm (
              dmm_id CHAR(16) PRIMARY KEY NOT NULL,
              video_id INTEGER NOT NULL REFERENCES posts(id),
              hash_value TEXT NOT NULL UNIQUE,
              created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS activities (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              receiver_name TEXT NOT NULL,
              sender_name TEXT,
              media_type TEXT NOT NULL,
              liked_post_id INTEGER,
              liked_post_url TEXT,
              liked_user_profile_picture TEXT,
              followed_profile_picture TEXT,
              detected_post_id INTEGER,
              detected_post_url TEXT,
              detected_user_profile_picture TEXT,
              created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
            CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts(user_id);
            CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);
            CREATE INDEX IF NOT EXISTS idx_dmm_video_id ON dmm(video_id);
            CREATE INDEX IF NOT EXISTS idx_activities_receiver ON activities(receiver_name);
            "#,
        )?;
        Ok(())
    }

    // -------------------- users --------------------

    pub fn create_user(
        &mut self,
        name: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        security_key: &EncryptedUserKey,
    ) -> Result<User> {
        validate_username(username)?;
        let created_at = now_s()? as i64;
        self.conn.execute(
            r#"
            INSERT INTO users(name, username, email, password_hash, security_key, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![name, username, email, password_hash, security_key.as_str(), created_at],
        )?;
        let user_id = self.conn.last_insert_rowid();
        self.user_by_id(user_id)?
            .ok_or_else(|| anyhow!("user row vanished after insert"))
    }

    pub fn user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {} FROM users WHERE user_id = ?1", USER_COLUMNS),
                params![user_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Existence check used at signup: a user "exists" when either the
    /// username or the email is already taken.
    pub fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>> {
        if let Some(user) = self.user_by_username(username)? {
            return Ok(Some(user));
        }
        let user = self
            .conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Add one strike, saturating at the limit. Returns the new counter.
    pub fn bump_warning(&mut self, user_id: i64) -> Result<u32> {
        self.conn.execute(
            "UPDATE users SET warning = MIN(warning + 1, ?1) WHERE user_id = ?2",
            params![WARNING_LIMIT, user_id],
        )?;
        let warning: u32 = self.conn.query_row(
            "SELECT warning FROM users WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(warning)
    }

    /// Remove a user row; the sealed user key goes with it.
    pub fn delete_user(&mut self, user_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }

    // -------------------- posts --------------------

    pub fn insert_post(
        &mut self,
        user_id: i64,
        media_url: &str,
        caption: &str,
        media_type: MediaType,
    ) -> Result<Post> {
        let created_at = now_s()? as i64;
        self.conn.execute(
            r#"
            INSERT INTO posts(user_id, media_url, caption, media_type, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![user_id, media_url, caption, media_type.as_str(), created_at],
        )?;
        let id = self.conn.last_insert_rowid();
        self.post_by_id(id)?
            .ok_or_else(|| anyhow!("post row vanished after insert"))
    }

    pub fn post_by_id(&self, id: i64) -> Result<Option<Post>> {
        let post = self
            .conn
            .query_row(
                &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
                params![id],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    pub fn posts_by_user(&self, user_id: i64) -> Result<Vec<Post>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM posts WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            POST_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], post_from_row)?;
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }

    /// Delete a post and its provenance record.
    pub fn delete_post(&mut self, post_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM dmm WHERE video_id = ?1", params![post_id])?;
        self.conn
            .execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
        Ok(())
    }

    // -------------------- provenance --------------------

    pub fn insert_provenance(
        &mut self,
        provenance_id: &ProvenanceId,
        post_id: i64,
        content_hash: &str,
    ) -> Result<ProvenanceInsert> {
        let created_at = now_s()? as i64;
        let inserted = self.conn.execute(
            r#"
            INSERT INTO dmm(dmm_id, video_id, hash_value, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![provenance_id.as_str(), post_id, content_hash, created_at],
        );
        match inserted {
            Ok(_) => Ok(ProvenanceInsert::Inserted),
            Err(err) if is_hash_value_violation(&err) => Ok(ProvenanceInsert::DuplicateHash),
            Err(err) => Err(err.into()),
        }
    }

    pub fn provenance_by_id(&self, provenance_id: &ProvenanceId) -> Result<Option<ProvenanceRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT dmm_id, video_id, hash_value, created_at FROM dmm WHERE dmm_id = ?1",
                params![provenance_id.as_str()],
                provenance_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Resolve a provenance id to its record, post and owning user.
    pub fn provenance_owner_by_id(
        &self,
        provenance_id: &ProvenanceId,
    ) -> Result<Option<ProvenanceOwner>> {
        self.provenance_owner_where("dmm.dmm_id = ?1", provenance_id.as_str())
    }

    /// Resolve a content hash to its record, post and owning user.
    pub fn provenance_owner_by_hash(&self, content_hash: &str) -> Result<Option<ProvenanceOwner>> {
        self.provenance_owner_where("dmm.hash_value = ?1", content_hash)
    }

    fn provenance_owner_where(&self, clause: &str, value: &str) -> Result<Option<ProvenanceOwner>> {
        let sql = format!(
            r#"
            SELECT dmm.dmm_id, dmm.video_id, dmm.hash_value, dmm.created_at,
                   {posts}, {users}
            FROM dmm
            JOIN posts ON dmm.video_id = posts.id
            JOIN users ON users.user_id = posts.user_id
            WHERE {clause}
            "#,
            posts = POST_COLUMNS_QUALIFIED,
            users = USER_COLUMNS_QUALIFIED,
            clause = clause,
        );
        let owner = self
            .conn
            .query_row(&sql, params![value], |row| {
                let record = provenance_from_row(row)?;
                let post = post_from_row_at(row, 4)?;
                let owner = user_from_row_at(row, 11)?;
                Ok(ProvenanceOwner {
                    record,
                    post,
                    owner,
                })
            })
            .optional()?;
        Ok(owner)
    }

    // -------------------- activities --------------------

    /// Append a theft-detection activity for the original owner.
    pub fn append_theft_activity(
        &mut self,
        receiver_name: &str,
        sender_name: &str,
        sender_profile_picture: &str,
        post: &Post,
    ) -> Result<()> {
        let created_at = now_s()? as i64;
        self.conn.execute(
            r#"
            INSERT INTO activities(
              receiver_name, sender_name, media_type,
              detected_post_id, detected_post_url, detected_user_profile_picture,
              created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                receiver_name,
                sender_name,
                post.media_type.as_str(),
                post.id,
                post.media_url,
                sender_profile_picture,
                created_at
            ],
        )?;
        Ok(())
    }

    /// Newest-first activity feed for one receiver.
    pub fn activities_for(&self, username: &str, page: usize, limit: usize) -> Result<Vec<Activity>> {
        let limit = limit.max(1);
        let offset = page.saturating_sub(1) * limit;
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, receiver_name, sender_name, media_type,
                   liked_post_id, liked_post_url, liked_user_profile_picture,
                   followed_profile_picture,
                   detected_post_id, detected_post_url, detected_user_profile_picture,
                   created_at
            FROM activities
            WHERE receiver_name = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![username, limit as i64, offset as i64],
            activity_from_row,
        )?;
        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?);
        }
        Ok(activities)
    }
}

// -------------------- Row mapping --------------------

const USER_COLUMNS: &str = "user_id, name, username, email, password_hash, security_key, \
                            profile_picture, bio, warning, created_at, following_count, followers_count";
const USER_COLUMNS_QUALIFIED: &str = "users.user_id, users.name, users.username, users.email, \
                                      users.password_hash, users.security_key, users.profile_picture, \
                                      users.bio, users.warning, users.created_at, \
                                      users.following_count, users.followers_count";
const POST_COLUMNS: &str = "id, user_id, media_url, caption, likes_count, media_type, created_at";
const POST_COLUMNS_QUALIFIED: &str = "posts.id, posts.user_id, posts.media_url, posts.caption, \
                                      posts.likes_count, posts.media_type, posts.created_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    user_from_row_at(row, 0)
}

fn user_from_row_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(base)?,
        name: row.get(base + 1)?,
        username: row.get(base + 2)?,
        email: row.get(base + 3)?,
        password_hash: row.get(base + 4)?,
        security_key: EncryptedUserKey::from_stored(row.get(base + 5)?),
        profile_picture: row.get(base + 6)?,
        bio: row.get(base + 7)?,
        warning: row.get(base + 8)?,
        created_at: row.get(base + 9)?,
        following_count: row.get(base + 10)?,
        followers_count: row.get(base + 11)?,
    })
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    post_from_row_at(row, 0)
}

fn post_from_row_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Post> {
    let media_type: String = row.get(base + 5)?;
    Ok(Post {
        id: row.get(base)?,
        user_id: row.get(base + 1)?,
        media_url: row.get(base + 2)?,
        caption: row.get(base + 3)?,
        likes_count: row.get(base + 4)?,
        media_type: media_type_from_db(&media_type, base + 5)?,
        created_at: row.get(base + 6)?,
    })
}

fn media_type_from_db(value: &str, column: usize) -> rusqlite::Result<MediaType> {
    match value {
        "image" => Ok(MediaType::Image),
        "video" => Ok(MediaType::Video),
        _ => Err(rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("unknown media type '{}'", value).into(),
        )),
    }
}

fn provenance_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProvenanceRecord> {
    let id: String = row.get(0)?;
    let provenance_id = ProvenanceId::parse(&id).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            err.to_string().into(),
        )
    })?;
    Ok(ProvenanceRecord {
        provenance_id,
        post_id: row.get(1)?,
        content_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn activity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        receiver_name: row.get(1)?,
        sender_name: row.get(2)?,
        media_type: row.get(3)?,
        liked_post_id: row.get(4)?,
        liked_post_url: row.get(5)?,
        liked_user_profile_picture: row.get(6)?,
        followed_profile_picture: row.get(7)?,
        detected_post_id: row.get(8)?,
        detected_post_url: row.get(9)?,
        detected_user_profile_picture: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn is_hash_value_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, Some(message)) => {
            failure.code == rusqlite::ErrorCode::ConstraintViolation
                && message.contains("dmm.hash_value")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::open(":memory:").expect("in-memory store")
    }

    fn seeded_user(store: &mut Store, username: &str) -> User {
        store
            .create_user(
                "Test User",
                username,
                &format!("{}@example.com", username),
                "hash",
                &EncryptedUserKey::from_stored("sealed=".to_string()),
            )
            .unwrap()
    }

    #[test]
    fn create_and_fetch_user() {
        let mut store = test_store();
        let user = seeded_user(&mut store, "alice");
        assert_eq!(user.warning, 0);
        assert_eq!(user.profile_picture, "user_default");
        assert!(!user.is_locked_out());

        let fetched = store.user_by_username("alice").unwrap().unwrap();
        assert_eq!(fetched.user_id, user.user_id);
        assert_eq!(fetched.security_key.as_str(), "sealed=");
    }

    #[test]
    fn username_and_email_are_unique() {
        let mut store = test_store();
        seeded_user(&mut store, "alice");
        assert!(store
            .create_user(
                "Other",
                "alice",
                "other@example.com",
                "hash",
                &EncryptedUserKey::from_stored("sealed=".to_string()),
            )
            .is_err());
        assert!(store
            .create_user(
                "Other",
                "alice2",
                "alice@example.com",
                "hash",
                &EncryptedUserKey::from_stored("sealed=".to_string()),
            )
            .is_err());
    }

    #[test]
    fn either_match_counts_as_existing() {
        let mut store = test_store();
        seeded_user(&mut store, "alice");
        assert!(store
            .find_user_by_username_or_email("alice", "nobody@example.com")
            .unwrap()
            .is_some());
        assert!(store
            .find_user_by_username_or_email("nobody", "alice@example.com")
            .unwrap()
            .is_some());
        assert!(store
            .find_user_by_username_or_email("nobody", "nobody@example.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn invalid_usernames_are_rejected() {
        let mut store = test_store();
        assert!(store
            .create_user(
                "X",
                "Not Valid",
                "x@example.com",
                "hash",
                &EncryptedUserKey::from_stored("sealed=".to_string()),
            )
            .is_err());
    }

    #[test]
    fn warning_is_monotone_and_capped() {
        let mut store = test_store();
        let user = seeded_user(&mut store, "mallory");
        assert_eq!(store.bump_warning(user.user_id).unwrap(), 1);
        assert_eq!(store.bump_warning(user.user_id).unwrap(), 2);
        assert_eq!(store.bump_warning(user.user_id).unwrap(), 3);
        assert_eq!(store.bump_warning(user.user_id).unwrap(), 3);
        assert!(store
            .user_by_id(user.user_id)
            .unwrap()
            .unwrap()
            .is_locked_out());
    }

    #[test]
    fn provenance_unique_hash_is_a_signal() {
        let mut store = test_store();
        let user = seeded_user(&mut store, "alice");
        let post_a = store
            .insert_post(user.user_id, "deepmark/alice/a.mp4", "", MediaType::Video)
            .unwrap();
        let post_b = store
            .insert_post(user.user_id, "deepmark/alice/b.mp4", "", MediaType::Video)
            .unwrap();

        let id_a = ProvenanceId::mint();
        assert_eq!(
            store
                .insert_provenance(&id_a, post_a.id, "hash-one")
                .unwrap(),
            ProvenanceInsert::Inserted
        );
        // same content hash, different id and post: the signal
        assert_eq!(
            store
                .insert_provenance(&ProvenanceId::mint(), post_b.id, "hash-one")
                .unwrap(),
            ProvenanceInsert::DuplicateHash
        );
        // same primary key: fatal, not a signal
        assert!(store.insert_provenance(&id_a, post_b.id, "hash-two").is_err());
    }

    #[test]
    fn owner_joins_resolve_by_id_and_hash() {
        let mut store = test_store();
        let user = seeded_user(&mut store, "alice");
        let post = store
            .insert_post(user.user_id, "deepmark/alice/a.mp4", "sunset", MediaType::Video)
            .unwrap();
        let id = ProvenanceId::mint();
        store.insert_provenance(&id, post.id, "hash-one").unwrap();

        let by_id = store.provenance_owner_by_id(&id).unwrap().unwrap();
        assert_eq!(by_id.owner.username, "alice");
        assert_eq!(by_id.post.id, post.id);
        assert_eq!(by_id.record.content_hash, "hash-one");

        let by_hash = store.provenance_owner_by_hash("hash-one").unwrap().unwrap();
        assert_eq!(by_hash.record.provenance_id, id);

        assert!(store
            .provenance_owner_by_id(&ProvenanceId::mint())
            .unwrap()
            .is_none());
    }

    #[test]
    fn deleting_a_post_destroys_its_provenance() {
        let mut store = test_store();
        let user = seeded_user(&mut store, "alice");
        let post = store
            .insert_post(user.user_id, "deepmark/alice/a.mp4", "", MediaType::Video)
            .unwrap();
        let id = ProvenanceId::mint();
        store.insert_provenance(&id, post.id, "hash-one").unwrap();

        store.delete_post(post.id).unwrap();
        assert!(store.post_by_id(post.id).unwrap().is_none());
        assert!(store.provenance_by_id(&id).unwrap().is_none());
        // the hash is free again
        let post2 = store
            .insert_post(user.user_id, "deepmark/alice/b.mp4", "", MediaType::Video)
            .unwrap();
        assert_eq!(
            store
                .insert_provenance(&ProvenanceId::mint(), post2.id, "hash-one")
                .unwrap(),
            ProvenanceInsert::Inserted
        );
    }

    #[test]
    fn theft_activities_land_in_the_receivers_feed() {
        let mut store = test_store();
        let alice = seeded_user(&mut store, "alice");
        let _mallory = seeded_user(&mut store, "mallory");
        let post = store
            .insert_post(alice.user_id, "deepmark/alice/a.mp4", "", MediaType::Video)
            .unwrap();

        store
            .append_theft_activity("alice", "mallory", "user_default", &post)
            .unwrap();

        let feed = store.activities_for("alice", 1, 5).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].sender_name.as_deref(), Some("mallory"));
        assert_eq!(feed[0].detected_post_id, Some(post.id));
        assert_eq!(feed[0].media_type, "video");
        assert!(store.activities_for("mallory", 1, 5).unwrap().is_empty());
    }

    #[test]
    fn activity_feed_paginates() {
        let mut store = test_store();
        let alice = seeded_user(&mut store, "alice");
        let post = store
            .insert_post(alice.user_id, "deepmark/alice/a.mp4", "", MediaType::Video)
            .unwrap();
        for _ in 0..7 {
            store
                .append_theft_activity("alice", "mallory", "user_default", &post)
                .unwrap();
        }
        assert_eq!(store.activities_for("alice", 1, 5).unwrap().len(), 5);
        assert_eq!(store.activities_for("alice", 2, 5).unwrap().len(), 2);
        assert_eq!(store.activities_for("alice", 3, 5).unwrap().len(), 0);
    }

    #[test]
    fn posts_by_user_are_newest_first() {
        let mut store = test_store();
        let user = seeded_user(&mut store, "alice");
        store
            .insert_post(user.user_id, "deepmark/alice/a.mp4", "", MediaType::Video)
            .unwrap();
        store
            .insert_post(user.user_id, "deepmark/alice/b.jpg", "", MediaType::Image)
            .unwrap();
        let posts = store.posts_by_user(user.user_id).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].media_url, "deepmark/alice/b.jpg");
    }

    #[test]
    fn deleting_a_user_removes_the_sealed_key() {
        let mut store = test_store();
        let user = seeded_user(&mut store, "alice");
        store.delete_user(user.user_id).unwrap();
        assert!(store.user_by_username("alice").unwrap().is_none());
    }
}
