//! SQLite-backed board store.

use crate::store::{board_key, BoardStore};
use crate::{Result, RetroError};
use chrono::Utc;
use retro_types::Board;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Boards stored as JSON rows with an absolute expiry in unix milliseconds.
pub struct SqliteBoardStore {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl SqliteBoardStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path, ttl: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?, ttl)
    }

    pub fn open_in_memory(ttl: Duration) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, ttl)
    }

    fn with_connection(conn: Connection, ttl: Duration) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            ttl,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS boards (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_boards_expires_at ON boards(expires_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RetroError::StorePoisoned)
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Move the boards table aside so every query fails.
    #[cfg(test)]
    pub(crate) fn break_schema_for_test(&self) {
        self.lock()
            .unwrap()
            .execute_batch("ALTER TABLE boards RENAME TO boards_old")
            .unwrap();
    }
}

impl BoardStore for SqliteBoardStore {
    fn get(&self, board_id: &str) -> Result<Board> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM boards WHERE key = ?1 AND expires_at > ?2",
                params![board_key(board_id), Self::now_millis()],
                |row| row.get(0),
            )
            .optional()?;
        let data = data.ok_or_else(|| RetroError::BoardNotFound(board_id.to_string()))?;
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, board: &Board) -> Result<()> {
        let data = serde_json::to_string(board)?;
        let expires_at = Self::now_millis() + self.ttl.as_millis() as i64;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO boards (key, data, expires_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET data = excluded.data, expires_at = excluded.expires_at
            "#,
            params![board_key(&board.id), data, expires_at],
        )?;
        Ok(())
    }

    fn exists(&self, board_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found = conn.query_row(
            "SELECT COUNT(*) > 0 FROM boards WHERE key = ?1 AND expires_at > ?2",
            params![board_key(board_id), Self::now_millis()],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn delete(&self, board_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM boards WHERE key = ?1", params![board_key(board_id)])?;
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM boards WHERE expires_at <= ?1",
            params![Self::now_millis()],
        )?;
        if removed > 0 {
            debug!(target: "retro::store", "Purged {} expired boards", removed);
        }
        Ok(removed)
    }
}
