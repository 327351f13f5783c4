//! Local durable key/value storage capability.
//!
//! # Responsibility
//! - Define the `get_item`/`set_item`/`remove_item` contract the pending
//!   queue persists through.
//! - Provide a SQLite-backed implementation that survives process restarts
//!   and an in-memory implementation for tests.
//!
//! # Invariants
//! - `set_item` is atomic per key: readers observe the old or new value.
//! - Implementations never panic on lock poisoning; they return
//!   `StorageError::Poisoned`.

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod sqlite;

pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

pub type StorageResult<T> = Result<T, StorageError>;

/// Local persistence failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("local storage database error: {0}")]
    Db(#[from] crate::db::DbError),
    #[error("local storage lock poisoned")]
    Poisoned,
    #[error("local storage worker failed: {0}")]
    Worker(String),
    #[error("local storage write rejected: {0}")]
    WriteRejected(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(crate::db::DbError::Sqlite(value))
    }
}

/// Durable string key/value storage owned by the host device.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
    async fn remove_item(&self, key: &str) -> StorageResult<()>;
}
