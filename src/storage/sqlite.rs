use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::error::{StorageError, StorageResult};

/// Shared handle to the local medium: one SQLite connection used by the
/// counter store and the session tracker.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS article_likes (
                    article_id TEXT PRIMARY KEY,
                    likes INTEGER NOT NULL DEFAULT 0
                );
                CREATE TABLE IF NOT EXISTS article_views (
                    article_id TEXT PRIMARY KEY,
                    views INTEGER NOT NULL DEFAULT 0
                );
                CREATE TABLE IF NOT EXISTS user_liked (
                    article_id TEXT PRIMARY KEY,
                    liked_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS session_views (
                    session_id TEXT NOT NULL,
                    article_id TEXT NOT NULL,
                    seen_at INTEGER NOT NULL,
                    PRIMARY KEY (session_id, article_id)
                );
                CREATE INDEX IF NOT EXISTS idx_session_seen_at ON session_views(seen_at);",
            )
        })?;

        info!("Database migration completed");
        Ok(())
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(f(&mut conn)?)
    }
}

pub(crate) fn to_sql_count(count: u64) -> StorageResult<i64> {
    i64::try_from(count).map_err(|_| StorageError::OutOfRange(i64::MAX))
}

pub(crate) fn from_sql_count(value: i64) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| StorageError::OutOfRange(value))
}
