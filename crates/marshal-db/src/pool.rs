//! SQLite pool bootstrap.
//!
//! All of Marshal's configuration lives in one SQLite file. Connections are
//! handed out by an `r2d2` pool; each one is switched to WAL journaling and
//! gets foreign keys plus the busy timeout applied before first use.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout applied to every pooled connection, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Upper bound on pooled connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// The shared SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors raised while bringing up the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Opens the database at `db_path` (creating it if absent) and builds the
/// pool around it.
///
/// `:memory:` is accepted for tests, with the caveat that every pooled
/// connection then sees its own private database; anything exercising more
/// than one connection needs a file-backed path.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| init_connection(conn, settings.busy_timeout_ms));

    Ok(Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?)
}

/// Per-connection setup: WAL journaling, foreign keys, busy timeout.
///
/// WAL must be confirmed, not merely requested: on a filesystem without
/// proper locking SQLite quietly stays in rollback mode. In-memory
/// databases report `memory` and are left alone.
fn init_connection(conn: &mut Connection, busy_timeout_ms: u64) -> Result<(), rusqlite::Error> {
    let journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if journal_mode != "wal" && journal_mode != "memory" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("journal_mode is {journal_mode}, expected wal")),
        ));
    }

    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", busy_timeout_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma(conn: &Connection, name: &str) -> String {
        conn.query_row(&format!("PRAGMA {name};"), [], |row| {
            row.get::<_, rusqlite::types::Value>(0)
        })
        .map(|v| match v {
            rusqlite::types::Value::Integer(n) => n.to_string(),
            rusqlite::types::Value::Text(s) => s,
            other => format!("{other:?}"),
        })
        .expect("pragma query")
    }

    #[test]
    fn pool_applies_runtime_settings() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
        };

        let pool = create_pool(":memory:", settings).expect("pool creation should succeed");
        assert_eq!(pool.max_size(), 3);

        let conn = pool.get().expect("should get a connection");
        let mode = pragma(&conn, "journal_mode");
        assert!(mode == "wal" || mode == "memory", "unexpected journal_mode: {mode}");
        assert_eq!(pragma(&conn, "foreign_keys"), "1");
        assert_eq!(pragma(&conn, "busy_timeout"), "2500");
    }

    #[test]
    fn pool_persists_to_file() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("marshal.db");
        let path_str = path.to_str().expect("utf-8 path");

        {
            let pool = create_pool(path_str, DbRuntimeSettings::default())
                .expect("pool creation should succeed");
            let conn = pool.get().expect("should get a connection");
            conn.execute_batch("CREATE TABLE scratch (id INTEGER PRIMARY KEY);")
                .expect("should create table");
        }

        let pool = create_pool(path_str, DbRuntimeSettings::default())
            .expect("reopening pool should succeed");
        let conn = pool.get().expect("should get a connection");
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'scratch')",
                [],
                |row| row.get(0),
            )
            .expect("should query sqlite_master");
        assert!(exists, "table should survive pool re-creation");
    }
}
