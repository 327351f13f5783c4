//! SQLite-backed key/value store.
//!
//! # Invariants
//! - Every call runs on the blocking pool; async callers never block on disk.
//! - One connection is shared behind a mutex; statements are short.

use super::{KeyValueStore, StorageError, StorageResult};
use crate::db::{open_db, open_db_in_memory};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Durable store backed by the `kv_items` table.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyValueStore {
    /// Opens (or creates) the store at `path` and ensures its schema.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn run<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StorageError::Poisoned)?;
            op(&guard)
        })
        .await
        .map_err(|err| StorageError::Worker(err.to_string()))?
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let key = key.to_string();
        self.run(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_items WHERE key = ?1;",
                    [key.as_str()],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO kv_items (key, value, updated_at)
                 VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at;",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM kv_items WHERE key = ?1;", [key.as_str()])?;
            Ok(())
        })
        .await
    }
}
