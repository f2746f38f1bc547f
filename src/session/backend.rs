//! Session persistence backends.
//!
//! The store keeps the live copy of every session in memory; a backend only
//! has to load a session on first contact and persist it after mutations.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

use super::{UsageCounter, UserId, UserSession};
use crate::util::epoch_secs;

/// Key-value persistence for sessions, keyed by user id.
pub trait SessionBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Load a previously saved session.
    fn load(&self, user_id: &UserId) -> Result<Option<UserSession>>;

    /// Insert or replace a session.
    fn save(&self, session: &UserSession) -> Result<()>;
}

// ── In-memory backend ────────────────────────────────────────────

/// Process-lifetime backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sessions: Mutex<HashMap<UserId, UserSession>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl SessionBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self, user_id: &UserId) -> Result<Option<UserSession>> {
        Ok(self.sessions.lock().get(user_id).cloned())
    }

    fn save(&self, session: &UserSession) -> Result<()> {
        self.sessions
            .lock()
            .insert(session.user_id.clone(), session.clone());
        Ok(())
    }
}

// ── SQLite backend ───────────────────────────────────────────────

/// SQLite-backed session table.
///
/// Table: `user_sessions(user_id, direction, ui_language, tier,
/// usage_day, usage_count, updated_at)`.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the session database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open session database {}", db_path.display()))?;
        Self::init(conn)
    }

    /// In-memory database, for tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_sessions (
                user_id TEXT PRIMARY KEY,
                direction TEXT NOT NULL,
                ui_language TEXT NOT NULL,
                tier TEXT NOT NULL,
                usage_day TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored sessions.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM user_sessions", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}

impl SessionBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn load(&self, user_id: &UserId) -> Result<Option<UserSession>> {
        let conn = self.conn.lock();
        let row: Option<(String, String, String, String, i64)> = conn
            .query_row(
                "SELECT direction, ui_language, tier, usage_day, usage_count
                 FROM user_sessions WHERE user_id = ?1",
                params![user_id.as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((direction, ui_language, tier, day, count)) = row else {
            return Ok(None);
        };

        let day = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
            .with_context(|| format!("Corrupt usage_day '{day}' for user {user_id}"))?;

        Ok(Some(UserSession {
            user_id: user_id.clone(),
            direction,
            ui_language,
            tier,
            usage: UsageCounter {
                day,
                count: u32::try_from(count).unwrap_or_default(),
            },
        }))
    }

    fn save(&self, session: &UserSession) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO user_sessions
                (user_id, direction, ui_language, tier, usage_day, usage_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                direction = excluded.direction,
                ui_language = excluded.ui_language,
                tier = excluded.tier,
                usage_day = excluded.usage_day,
                usage_count = excluded.usage_count,
                updated_at = excluded.updated_at",
            params![
                session.user_id.as_str(),
                session.direction,
                session.ui_language,
                session.tier,
                session.usage.day.format("%Y-%m-%d").to_string(),
                i64::from(session.usage.count),
                epoch_secs(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, count: u32) -> UserSession {
        UserSession {
            user_id: UserId::from(id),
            direction: "ru_de".into(),
            ui_language: "ru".into(),
            tier: "a1".into(),
            usage: UsageCounter {
                day: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                count,
            },
        }
    }

    #[test]
    fn memory_roundtrip() {
        let backend = MemoryBackend::new();
        assert!(backend.load(&UserId::from("u1")).unwrap().is_none());
        backend.save(&session("u1", 3)).unwrap();
        assert_eq!(backend.load(&UserId::from("u1")).unwrap(), Some(session("u1", 3)));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn sqlite_upserts() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.save(&session("u1", 3)).unwrap();
        backend.save(&session("u1", 4)).unwrap();
        backend.save(&session("u2", 0)).unwrap();

        assert_eq!(backend.count().unwrap(), 2);
        let loaded = backend.load(&UserId::from("u1")).unwrap().unwrap();
        assert_eq!(loaded.usage.count, 4);
        assert_eq!(loaded.tier, "a1");
    }

    #[test]
    fn sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.save(&session("42", 25)).unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.load(&UserId::from("42")).unwrap(), Some(session("42", 25)));
        assert!(backend.load(&UserId::from("43")).unwrap().is_none());
    }

    #[test]
    fn sqlite_rejects_corrupt_day() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .conn
            .lock()
            .execute(
                "INSERT INTO user_sessions VALUES ('bad', 'ru_de', 'ru', 'free', 'yesterday', 1, 0)",
                [],
            )
            .unwrap();
        let err = backend.load(&UserId::from("bad")).unwrap_err();
        assert!(err.to_string().contains("Corrupt usage_day"));
    }
}
