//! Connection bootstrap utilities for SQLite.
//!
//! # Invariants
//! - Returned connections run in WAL journal mode when file-backed.
//! - Returned connections carry the `kv_items` schema at `SCHEMA_VERSION`.

use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Schema version written to `PRAGMA user_version` by this binary.
pub const SCHEMA_VERSION: u32 = 1;

const KV_ITEMS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv_items (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
);
";

#[derive(Debug, Clone, Copy)]
enum OpenMode {
    File,
    Memory,
}

impl OpenMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens a SQLite database file and ensures the key/value schema.
///
/// # Side effects
/// - Creates the file when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with(OpenMode::File, || Connection::open(path.as_ref()))
}

/// Opens an in-memory SQLite database and ensures the key/value schema.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(OpenMode::Memory, Connection::open_in_memory)
}

fn open_with(
    mode: OpenMode,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode={}",
        mode.as_str()
    );

    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, mode) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, mode: OpenMode) -> DbResult<()> {
    if matches!(mode, OpenMode::File) {
        // journal_mode returns a row, so it cannot go through execute_batch.
        conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
    }
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    ensure_schema(conn)
}

/// Creates `kv_items` on a fresh database; refuses files from newer builds.
fn ensure_schema(conn: &mut Connection) -> DbResult<()> {
    let db_version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    if db_version > SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported: SCHEMA_VERSION,
        });
    }
    if db_version == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(KV_ITEMS_SCHEMA)?;
    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    tx.commit()?;
    info!(
        "event=db_schema module=db status=ok from_version={} to_version={}",
        db_version, SCHEMA_VERSION
    );
    Ok(())
}
