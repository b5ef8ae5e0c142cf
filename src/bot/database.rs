//! Persistent SQLite storage for users, shortcuts and admins.
//!
//! Every operation is its own unit of work: lock, run, done. No transaction
//! ever spans a round-trip to Telegram.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::bot::error::BotError;
use crate::bot::shortcut::{ContentKind, Shortcut, StoredUser, UserSummary};

/// Persistent SQLite database for the bot.
pub struct Database {
    conn: Mutex<Connection>,
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Database {
    /// Create a new in-memory database (tests).
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema();
        db
    }

    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self, BotError> {
        let conn = Connection::open(path)?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema();

        let (users, shortcuts) = db.counts();
        info!("Opened database at {:?} ({} users, {} shortcuts)", path, users, shortcuts);
        Ok(db)
    }

    fn init_schema(&self) {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                telegram_id INTEGER PRIMARY KEY,
                username TEXT,
                registration_dt TEXT NOT NULL,
                start_param TEXT
            );

            CREATE TABLE IF NOT EXISTS shortcuts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER NOT NULL REFERENCES users(telegram_id),
                shortcut_name TEXT NOT NULL,
                content_type TEXT NOT NULL,
                text TEXT,
                content TEXT,
                entities TEXT,
                add_dt TEXT NOT NULL,
                update_dt TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 0,
                last_used_dt TEXT,
                UNIQUE (telegram_id, shortcut_name)
            );

            CREATE INDEX IF NOT EXISTS idx_shortcuts_owner ON shortcuts(telegram_id);

            CREATE TABLE IF NOT EXISTS admins (
                telegram_id INTEGER PRIMARY KEY
            );
        "#).expect("Failed to initialize database schema");
    }

    fn counts(&self) -> (usize, usize) {
        let conn = self.conn.lock().unwrap();
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap_or(0);
        let shortcuts: i64 = conn
            .query_row("SELECT COUNT(*) FROM shortcuts", [], |row| row.get(0))
            .unwrap_or(0);
        (users as usize, shortcuts as usize)
    }

    // ==================== USERS ====================

    /// Register a user on first contact.
    pub fn create_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
        start_param: Option<&str>,
    ) -> Result<(), BotError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (telegram_id, username, registration_dt, start_param)
             VALUES (?1, ?2, ?3, ?4)",
            params![telegram_id, username, now(), start_param],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                BotError::DuplicateUser(telegram_id)
            } else {
                BotError::Persistence(e)
            }
        })?;
        Ok(())
    }

    pub fn get_user(&self, telegram_id: i64) -> Result<Option<StoredUser>, BotError> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT telegram_id, username, registration_dt, start_param
                 FROM users WHERE telegram_id = ?1",
                params![telegram_id],
                |row| {
                    Ok(StoredUser {
                        telegram_id: row.get(0)?,
                        username: row.get(1)?,
                        registration_dt: row.get(2)?,
                        start_param: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Per-user registration time, shortcut count and acquisition tag.
    /// LEFT JOIN so zero-shortcut users still show up.
    pub fn list_users_summary(&self) -> Result<Vec<UserSummary>, BotError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT u.telegram_id, u.username, u.registration_dt, COUNT(s.id), u.start_param
             FROM users u LEFT JOIN shortcuts s ON s.telegram_id = u.telegram_id
             GROUP BY u.telegram_id
             ORDER BY u.registration_dt, u.telegram_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(UserSummary {
                telegram_id: row.get(0)?,
                username: row.get(1)?,
                registration_dt: row.get(2)?,
                shortcut_count: row.get(3)?,
                start_param: row.get(4)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // ==================== SHORTCUTS ====================

    /// Insert a shortcut with usage counter 0 and both timestamps set to now.
    /// Rejects an unknown owner and a duplicate (owner, name) pair.
    pub fn add_shortcut(
        &self,
        owner_id: i64,
        name: &str,
        kind: ContentKind,
        text: Option<&str>,
        content: Option<&str>,
        entities: Option<&str>,
    ) -> Result<i64, BotError> {
        let conn = self.conn.lock().unwrap();

        let owner_exists: bool = conn
            .query_row(
                "SELECT 1 FROM users WHERE telegram_id = ?1",
                params![owner_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !owner_exists {
            return Err(BotError::OwnerNotFound(owner_id));
        }

        let ts = now();
        conn.execute(
            "INSERT INTO shortcuts
                 (telegram_id, shortcut_name, content_type, text, content, entities, add_dt, update_dt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![owner_id, name, kind.as_str(), text, content, entities, ts],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                BotError::DuplicateName { owner: owner_id, name: name.to_string() }
            } else {
                BotError::Persistence(e)
            }
        })?;

        Ok(conn.last_insert_rowid())
    }

    fn shortcut_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Shortcut, Option<BotError>)> {
        let kind_raw: String = row.get(3)?;
        let (kind, kind_err) = match ContentKind::parse(&kind_raw) {
            Ok(kind) => (kind, None),
            // Defer kind errors so query_map stays infallible at the row level.
            Err(e) => (ContentKind::Text, Some(e)),
        };
        let shortcut = Shortcut {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            kind,
            text: row.get(4)?,
            content: row.get(5)?,
            entities: row.get(6)?,
            add_dt: row.get(7)?,
            update_dt: row.get(8)?,
            usage_count: row.get(9)?,
            last_used_dt: row.get(10)?,
        };
        Ok((shortcut, kind_err))
    }

    const SHORTCUT_COLUMNS: &'static str =
        "id, telegram_id, shortcut_name, content_type, text, content, entities,
         add_dt, update_dt, usage_count, last_used_dt";

    /// All shortcuts of one owner, ordered by internal id. An unknown owner
    /// yields an empty collection, not an error.
    pub fn get_shortcuts(&self, owner_id: i64) -> Result<Vec<Shortcut>, BotError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM shortcuts WHERE telegram_id = ?1 ORDER BY id",
            Self::SHORTCUT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![owner_id], Self::shortcut_from_row)?;

        let mut result = Vec::new();
        for row in rows {
            let (shortcut, kind_err) = row?;
            if let Some(e) = kind_err {
                return Err(e);
            }
            result.push(shortcut);
        }
        Ok(result)
    }

    /// Exact-match lookup by (owner, name).
    pub fn get_shortcut(&self, owner_id: i64, name: &str) -> Result<Option<Shortcut>, BotError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM shortcuts WHERE telegram_id = ?1 AND shortcut_name = ?2",
                    Self::SHORTCUT_COLUMNS
                ),
                params![owner_id, name],
                Self::shortcut_from_row,
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((_, Some(e))) => Err(e),
            Some((shortcut, None)) => Ok(Some(shortcut)),
        }
    }

    /// Full replace of the mutable fields, bumping update_dt. No-op if the
    /// id is absent.
    pub fn update_shortcut(
        &self,
        id: i64,
        new_name: &str,
        new_kind: ContentKind,
        new_text: Option<&str>,
        new_content: Option<&str>,
    ) -> Result<(), BotError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE shortcuts
             SET shortcut_name = ?2, content_type = ?3, text = ?4, content = ?5, update_dt = ?6
             WHERE id = ?1",
            params![id, new_name, new_kind.as_str(), new_text, new_content, now()],
        )?;
        Ok(())
    }

    /// Remove a shortcut. Idempotent: a missing id is a no-op.
    pub fn delete_shortcut(&self, id: i64) -> Result<(), BotError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM shortcuts WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Bump the usage counter and last-used timestamp. Chosen-result events
    /// are at-least-once, so this is a plain monotone increment; a redelivery
    /// overcounts but never decreases anything. No-op if the id is absent.
    pub fn increment_usage(&self, id: i64) -> Result<(), BotError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE shortcuts SET usage_count = usage_count + 1, last_used_dt = ?2 WHERE id = ?1",
            params![id, now()],
        )?;
        Ok(())
    }

    // ==================== ADMINS ====================

    pub fn is_admin(&self, telegram_id: i64) -> Result<bool, BotError> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM admins WHERE telegram_id = ?1",
                params![telegram_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    #[cfg(test)]
    pub fn add_admin(&self, telegram_id: i64) -> Result<(), BotError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO admins (telegram_id) VALUES (?1)",
            params![telegram_id],
        )?;
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user(telegram_id: i64) -> Database {
        let db = Database::new();
        db.create_user(telegram_id, Some("alice"), None).unwrap();
        db
    }

    #[test]
    fn test_create_user_rejects_duplicate() {
        let db = db_with_user(100);
        let err = db.create_user(100, Some("alice"), None).unwrap_err();
        assert!(matches!(err, BotError::DuplicateUser(100)));
    }

    #[test]
    fn test_create_user_captures_start_param() {
        let db = Database::new();
        db.create_user(100, None, Some("campaign1")).unwrap();
        let user = db.get_user(100).unwrap().unwrap();
        assert_eq!(user.start_param.as_deref(), Some("campaign1"));
        assert!(user.username.is_none());
    }

    #[test]
    fn test_get_user_absent_is_none() {
        let db = Database::new();
        assert!(db.get_user(42).unwrap().is_none());
    }

    #[test]
    fn test_add_then_get_round_trip() {
        let db = db_with_user(100);
        let id = db
            .add_shortcut(100, "cv", ContentKind::Document, Some("my cv"), Some("file123"), None)
            .unwrap();

        let s = db.get_shortcut(100, "cv").unwrap().unwrap();
        assert_eq!(s.id, id);
        assert_eq!(s.owner_id, 100);
        assert_eq!(s.name, "cv");
        assert_eq!(s.kind, ContentKind::Document);
        assert_eq!(s.text.as_deref(), Some("my cv"));
        assert_eq!(s.content.as_deref(), Some("file123"));
        assert_eq!(s.usage_count, 0);
        assert!(s.last_used_dt.is_none());
        assert_eq!(s.add_dt, s.update_dt);
    }

    #[test]
    fn test_add_shortcut_unknown_owner() {
        let db = Database::new();
        let err = db
            .add_shortcut(7, "cv", ContentKind::Text, Some("hi"), None, None)
            .unwrap_err();
        assert!(matches!(err, BotError::OwnerNotFound(7)));
    }

    #[test]
    fn test_add_shortcut_rejects_duplicate_name() {
        let db = db_with_user(100);
        db.add_shortcut(100, "cv", ContentKind::Text, Some("a"), None, None).unwrap();
        let err = db
            .add_shortcut(100, "cv", ContentKind::Text, Some("b"), None, None)
            .unwrap_err();
        assert!(matches!(err, BotError::DuplicateName { owner: 100, .. }));
    }

    #[test]
    fn test_same_name_allowed_for_different_owners() {
        let db = db_with_user(100);
        db.create_user(200, Some("bob"), None).unwrap();
        db.add_shortcut(100, "cv", ContentKind::Text, Some("a"), None, None).unwrap();
        db.add_shortcut(200, "cv", ContentKind::Text, Some("b"), None, None).unwrap();
        assert_eq!(db.get_shortcuts(200).unwrap().len(), 1);
    }

    #[test]
    fn test_get_shortcuts_empty_for_unknown_owner() {
        let db = Database::new();
        assert!(db.get_shortcuts(999).unwrap().is_empty());
    }

    #[test]
    fn test_get_shortcuts_ordered_by_id() {
        let db = db_with_user(100);
        db.add_shortcut(100, "b", ContentKind::Text, Some("2"), None, None).unwrap();
        db.add_shortcut(100, "a", ContentKind::Text, Some("1"), None, None).unwrap();
        let names: Vec<String> = db
            .get_shortcuts(100)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_update_shortcut_replaces_fields_and_bumps_timestamp() {
        let db = db_with_user(100);
        let id = db
            .add_shortcut(100, "old", ContentKind::Text, Some("t"), None, None)
            .unwrap();
        db.update_shortcut(id, "new", ContentKind::Location, None, Some(r#"{"latitude":1.0,"longitude":2.0}"#))
            .unwrap();

        let s = db.get_shortcut(100, "new").unwrap().unwrap();
        assert_eq!(s.kind, ContentKind::Location);
        assert!(s.text.is_none());
        assert!(s.update_dt >= s.add_dt);
        assert!(db.get_shortcut(100, "old").unwrap().is_none());
    }

    #[test]
    fn test_update_absent_is_noop() {
        let db = Database::new();
        db.update_shortcut(12345, "x", ContentKind::Text, None, None).unwrap();
    }

    #[test]
    fn test_delete_shortcut_is_idempotent() {
        let db = db_with_user(100);
        let id = db
            .add_shortcut(100, "cv", ContentKind::Text, Some("t"), None, None)
            .unwrap();
        db.delete_shortcut(id).unwrap();
        db.delete_shortcut(id).unwrap();
        assert!(db.get_shortcut(100, "cv").unwrap().is_none());
    }

    #[test]
    fn test_increment_usage_is_monotonic() {
        let db = db_with_user(100);
        let id = db
            .add_shortcut(100, "cv", ContentKind::Text, Some("t"), None, None)
            .unwrap();

        let mut last_used = String::new();
        for n in 1..=5 {
            db.increment_usage(id).unwrap();
            let s = db.get_shortcut(100, "cv").unwrap().unwrap();
            assert_eq!(s.usage_count, n);
            let used = s.last_used_dt.unwrap();
            assert!(used >= last_used);
            last_used = used;
        }
    }

    #[test]
    fn test_increment_usage_absent_is_noop() {
        let db = Database::new();
        db.increment_usage(999).unwrap();
    }

    #[test]
    fn test_list_users_summary_includes_zero_shortcut_users() {
        let db = db_with_user(100);
        db.create_user(200, Some("bob"), Some("ad7")).unwrap();
        db.add_shortcut(100, "cv", ContentKind::Text, Some("t"), None, None).unwrap();
        db.add_shortcut(100, "card", ContentKind::Text, Some("t"), None, None).unwrap();

        let summary = db.list_users_summary().unwrap();
        assert_eq!(summary.len(), 2);

        let alice = summary.iter().find(|u| u.telegram_id == 100).unwrap();
        assert_eq!(alice.shortcut_count, 2);

        let bob = summary.iter().find(|u| u.telegram_id == 200).unwrap();
        assert_eq!(bob.shortcut_count, 0);
        assert_eq!(bob.start_param.as_deref(), Some("ad7"));
    }

    #[test]
    fn test_is_admin() {
        let db = Database::new();
        assert!(!db.is_admin(100).unwrap());
        db.add_admin(100).unwrap();
        assert!(db.is_admin(100).unwrap());
    }

    #[test]
    fn test_open_creates_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shortcuts.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_user(1, Some("alice"), None).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.get_user(1).unwrap().is_some());
    }
}
