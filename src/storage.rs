//! SQLite storage layer for tandem.
//!
//! Owns the schema and all queries for user accounts, friend requests, and
//! the friendship graph. The friend-request table keeps a canonicalized
//! unordered pair (`user_lo`, `user_hi`) alongside the directed
//! sender/receiver columns; a unique index on the pair closes the race where
//! two users request each other at the same time, whichever direction the
//! rows arrive in.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    NotFound(String),
    AlreadyExists(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

/// True when an insert bounced off a UNIQUE constraint (as opposed to any
/// other SQLite failure). Used to translate constraint hits into
/// [`StorageError::AlreadyExists`] at the two places that rely on them.
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Order two user IDs into the canonical (lo, hi) form used by the
/// `friend_requests` pair columns and the `friendships` primary key.
pub fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// User account row stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub bio: String,
    pub profile_pic: String,
    pub native_language: String,
    pub learning_language: String,
    pub location: String,
    pub is_onboarded: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Friend request row stored in the database.
///
/// The canonical pair columns (`user_lo`, `user_hi`) are derived from
/// sender/receiver on insert and never read back into this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestRow {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    /// "pending", "accepted", or "rejected"
    pub status: String,
    /// Whether the receiver's notification panel has displayed this request.
    pub seen: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Profile fields set when a user completes onboarding.
///
/// `profile_pic` is optional: `None` keeps whatever picture the account
/// already has (typically the generated initials avatar from signup).
#[derive(Debug, Clone)]
pub struct OnboardingUpdate {
    pub full_name: String,
    pub bio: String,
    pub native_language: String,
    pub learning_language: String,
    pub location: String,
    pub profile_pic: Option<String>,
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database, used by tests and ephemeral servers.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id                TEXT PRIMARY KEY,
                email             TEXT NOT NULL UNIQUE,
                password_hash     TEXT NOT NULL,
                full_name         TEXT NOT NULL,
                bio               TEXT NOT NULL DEFAULT '',
                profile_pic       TEXT NOT NULL DEFAULT '',
                native_language   TEXT NOT NULL DEFAULT '',
                learning_language TEXT NOT NULL DEFAULT '',
                location          TEXT NOT NULL DEFAULT '',
                is_onboarded      INTEGER NOT NULL DEFAULT 0,
                created_at        INTEGER NOT NULL,
                updated_at        INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_onboarded
                ON users(is_onboarded, created_at);

            CREATE TABLE IF NOT EXISTS friend_requests (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id   TEXT NOT NULL REFERENCES users(id),
                receiver_id TEXT NOT NULL REFERENCES users(id),
                user_lo     TEXT NOT NULL,
                user_hi     TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                seen        INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_friend_requests_pair
                ON friend_requests(user_lo, user_hi);
            CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver
                ON friend_requests(receiver_id, status);
            CREATE INDEX IF NOT EXISTS idx_friend_requests_sender
                ON friend_requests(sender_id, status);
            CREATE INDEX IF NOT EXISTS idx_friend_requests_unseen
                ON friend_requests(receiver_id, seen);

            CREATE TABLE IF NOT EXISTS friendships (
                user_lo     TEXT NOT NULL REFERENCES users(id),
                user_hi     TEXT NOT NULL REFERENCES users(id),
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (user_lo, user_hi)
            );
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Insert a new user account. Fails with [`StorageError::AlreadyExists`]
    /// when the email address is already registered.
    pub fn insert_user(&self, row: &UserRow) -> Result<(), StorageError> {
        let res = self.conn.execute(
            "INSERT INTO users
             (id, email, password_hash, full_name, bio, profile_pic,
              native_language, learning_language, location, is_onboarded,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                row.id,
                row.email,
                row.password_hash,
                row.full_name,
                row.bio,
                row.profile_pic,
                row.native_language,
                row.learning_language,
                row.location,
                row.is_onboarded as i32,
                row.created_at as i64,
                row.updated_at as i64,
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::AlreadyExists(
                "a user with this email already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, password_hash, full_name, bio, profile_pic,
                    native_language, learning_language, location, is_onboarded,
                    created_at, updated_at
             FROM users WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id], |row| {
                Ok(UserRow {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    full_name: row.get(3)?,
                    bio: row.get(4)?,
                    profile_pic: row.get(5)?,
                    native_language: row.get(6)?,
                    learning_language: row.get(7)?,
                    location: row.get(8)?,
                    is_onboarded: row.get::<_, i32>(9)? != 0,
                    created_at: row.get::<_, i64>(10)? as u64,
                    updated_at: row.get::<_, i64>(11)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, password_hash, full_name, bio, profile_pic,
                    native_language, learning_language, location, is_onboarded,
                    created_at, updated_at
             FROM users WHERE email = ?1",
        )?;
        let row = stmt
            .query_row(params![email], |row| {
                Ok(UserRow {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    full_name: row.get(3)?,
                    bio: row.get(4)?,
                    profile_pic: row.get(5)?,
                    native_language: row.get(6)?,
                    learning_language: row.get(7)?,
                    location: row.get(8)?,
                    is_onboarded: row.get::<_, i32>(9)? != 0,
                    created_at: row.get::<_, i64>(10)? as u64,
                    updated_at: row.get::<_, i64>(11)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Apply onboarding fields and flip the `is_onboarded` flag in one
    /// statement. Returns false when no such user exists.
    pub fn complete_onboarding(
        &self,
        user_id: &str,
        up: &OnboardingUpdate,
        now: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE users
             SET full_name = ?2, bio = ?3, native_language = ?4,
                 learning_language = ?5, location = ?6,
                 profile_pic = COALESCE(?7, profile_pic),
                 is_onboarded = 1, updated_at = ?8
             WHERE id = ?1",
            params![
                user_id,
                up.full_name,
                up.bio,
                up.native_language,
                up.learning_language,
                up.location,
                up.profile_pic,
                now as i64,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Users suitable for the "meet new learners" panel: onboarded accounts
    /// that are not the viewer and not already linked to the viewer.
    pub fn list_recommended(&self, viewer_id: &str) -> Result<Vec<UserRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.email, u.password_hash, u.full_name, u.bio, u.profile_pic,
                    u.native_language, u.learning_language, u.location, u.is_onboarded,
                    u.created_at, u.updated_at
             FROM users u
             WHERE u.id != ?1
               AND u.is_onboarded = 1
               AND NOT EXISTS (
                   SELECT 1 FROM friendships f
                   WHERE (f.user_lo = ?1 AND f.user_hi = u.id)
                      OR (f.user_lo = u.id AND f.user_hi = ?1)
               )
             ORDER BY u.created_at DESC",
        )?;
        let rows = stmt.query_map(params![viewer_id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                full_name: row.get(3)?,
                bio: row.get(4)?,
                profile_pic: row.get(5)?,
                native_language: row.get(6)?,
                learning_language: row.get(7)?,
                location: row.get(8)?,
                is_onboarded: row.get::<_, i32>(9)? != 0,
                created_at: row.get::<_, i64>(10)? as u64,
                updated_at: row.get::<_, i64>(11)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn count_users(&self) -> Result<u32, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u32)
    }

    // -----------------------------------------------------------------------
    // Friend requests
    // -----------------------------------------------------------------------

    /// Insert a new friend request. Returns the new row ID.
    ///
    /// The unique pair index means at most one request can ever exist between
    /// two users, regardless of direction; a second insert (including the
    /// reverse direction arriving concurrently) fails with
    /// [`StorageError::AlreadyExists`].
    pub fn insert_friend_request(&self, row: &FriendRequestRow) -> Result<i64, StorageError> {
        let (lo, hi) = pair_key(&row.sender_id, &row.receiver_id);
        let res = self.conn.execute(
            "INSERT INTO friend_requests
             (sender_id, receiver_id, user_lo, user_hi, status, seen,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.sender_id,
                row.receiver_id,
                lo,
                hi,
                row.status,
                row.seen as i32,
                row.created_at as i64,
                row.updated_at as i64,
            ],
        );
        match res {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::AlreadyExists(
                "a friend request already exists between these users".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_friend_request(&self, id: i64) -> Result<Option<FriendRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, receiver_id, status, seen, created_at, updated_at
             FROM friend_requests WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id], |row| {
                Ok(FriendRequestRow {
                    id: row.get(0)?,
                    sender_id: row.get(1)?,
                    receiver_id: row.get(2)?,
                    status: row.get(3)?,
                    seen: row.get::<_, i32>(4)? != 0,
                    created_at: row.get::<_, i64>(5)? as u64,
                    updated_at: row.get::<_, i64>(6)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Find the request between two users in either direction, if any.
    pub fn find_request_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<FriendRequestRow>, StorageError> {
        let (lo, hi) = pair_key(a, b);
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, receiver_id, status, seen, created_at, updated_at
             FROM friend_requests WHERE user_lo = ?1 AND user_hi = ?2",
        )?;
        let row = stmt
            .query_row(params![lo, hi], |row| {
                Ok(FriendRequestRow {
                    id: row.get(0)?,
                    sender_id: row.get(1)?,
                    receiver_id: row.get(2)?,
                    status: row.get(3)?,
                    seen: row.get::<_, i32>(4)? != 0,
                    created_at: row.get::<_, i64>(5)? as u64,
                    updated_at: row.get::<_, i64>(6)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Transition a pending request to a terminal status ("accepted" or
    /// "rejected"). The `status = 'pending'` guard makes this safe under
    /// concurrent resolution: exactly one caller observes `true`, everyone
    /// else gets `false` (already resolved, or no such request).
    pub fn resolve_friend_request(
        &self,
        id: i64,
        status: &str,
        now: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE friend_requests SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status = 'pending'",
            params![status, now as i64, id],
        )?;
        Ok(affected > 0)
    }

    /// Requests addressed to `receiver_id` with the given status, newest first.
    pub fn list_requests_for_receiver(
        &self,
        receiver_id: &str,
        status: &str,
    ) -> Result<Vec<FriendRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, receiver_id, status, seen, created_at, updated_at
             FROM friend_requests
             WHERE receiver_id = ?1 AND status = ?2
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![receiver_id, status], |row| {
            Ok(FriendRequestRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                status: row.get(3)?,
                seen: row.get::<_, i32>(4)? != 0,
                created_at: row.get::<_, i64>(5)? as u64,
                updated_at: row.get::<_, i64>(6)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Requests sent by `sender_id` with the given status, newest first.
    pub fn list_requests_from_sender(
        &self,
        sender_id: &str,
        status: &str,
    ) -> Result<Vec<FriendRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, receiver_id, status, seen, created_at, updated_at
             FROM friend_requests
             WHERE sender_id = ?1 AND status = ?2
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![sender_id, status], |row| {
            Ok(FriendRequestRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                status: row.get(3)?,
                seen: row.get::<_, i32>(4)? != 0,
                created_at: row.get::<_, i64>(5)? as u64,
                updated_at: row.get::<_, i64>(6)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Requests addressed to `receiver_id` that the notification panel has
    /// not displayed yet, regardless of status, newest first.
    pub fn list_unseen_for_receiver(
        &self,
        receiver_id: &str,
    ) -> Result<Vec<FriendRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, receiver_id, status, seen, created_at, updated_at
             FROM friend_requests
             WHERE receiver_id = ?1 AND seen = 0
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![receiver_id], |row| {
            Ok(FriendRequestRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                status: row.get(3)?,
                seen: row.get::<_, i32>(4)? != 0,
                created_at: row.get::<_, i64>(5)? as u64,
                updated_at: row.get::<_, i64>(6)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Flip every unseen request addressed to `receiver_id` to seen and
    /// return the affected rows as they were before the flip (`seen: false`).
    /// The single UPDATE ... RETURNING statement makes the read-and-flip
    /// atomic: a request inserted after this statement runs is not in the
    /// returned set and stays unseen for the next call.
    pub fn mark_all_requests_seen(
        &self,
        receiver_id: &str,
    ) -> Result<Vec<FriendRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "UPDATE friend_requests SET seen = 1
             WHERE receiver_id = ?1 AND seen = 0
             RETURNING id, sender_id, receiver_id, status, created_at, updated_at",
        )?;
        let rows = stmt.query_map(params![receiver_id], |row| {
            Ok(FriendRequestRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                status: row.get(3)?,
                seen: false,
                created_at: row.get::<_, i64>(4)? as u64,
                updated_at: row.get::<_, i64>(5)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        // RETURNING has no defined order; present newest first like the list
        // queries do.
        result.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(result)
    }

    pub fn count_pending_requests(&self) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM friend_requests WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    // -----------------------------------------------------------------------
    // Friendships
    // -----------------------------------------------------------------------

    /// Record that two users are friends. The link is stored once under the
    /// canonical pair key, so linking is symmetric and idempotent; returns
    /// true only when the link was newly created.
    pub fn link_friends(&self, a: &str, b: &str, now: u64) -> Result<bool, StorageError> {
        let (lo, hi) = pair_key(a, b);
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO friendships (user_lo, user_hi, created_at)
             VALUES (?1, ?2, ?3)",
            params![lo, hi, now as i64],
        )?;
        Ok(affected > 0)
    }

    pub fn are_friends(&self, a: &str, b: &str) -> Result<bool, StorageError> {
        let (lo, hi) = pair_key(a, b);
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM friendships WHERE user_lo = ?1 AND user_hi = ?2",
            params![lo, hi],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All users linked to `user_id`, most recently linked first.
    pub fn list_friends(&self, user_id: &str) -> Result<Vec<UserRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.email, u.password_hash, u.full_name, u.bio, u.profile_pic,
                    u.native_language, u.learning_language, u.location, u.is_onboarded,
                    u.created_at, u.updated_at
             FROM users u
             JOIN friendships f
               ON (f.user_lo = ?1 AND u.id = f.user_hi)
               OR (f.user_hi = ?1 AND u.id = f.user_lo)
             ORDER BY f.created_at DESC, u.id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                full_name: row.get(3)?,
                bio: row.get(4)?,
                profile_pic: row.get(5)?,
                native_language: row.get(6)?,
                learning_language: row.get(7)?,
                location: row.get(8)?,
                is_onboarded: row.get::<_, i32>(9)? != 0,
                created_at: row.get::<_, i64>(10)? as u64,
                updated_at: row.get::<_, i64>(11)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}
