//! SQLite bootstrap and schema entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections backing local durable storage.
//! - Create the key/value schema on first open.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - Storage code must not read/write items before the schema exists.

use thiserror::Error;

mod open;

pub use open::{open_db, open_db_in_memory, SCHEMA_VERSION};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}
