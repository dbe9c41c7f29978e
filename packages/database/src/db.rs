//! Database connection utilities.

use std::path::Path;

pub use duckdb::Connection;

use crate::DbError;

/// Opens (or creates) a `DuckDB` file, creating parent directories as
/// needed.
///
/// # Errors
///
/// Returns [`DbError`] if the directory or connection cannot be created.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;
    Ok(conn)
}

/// Opens a throwaway in-memory database.
///
/// # Errors
///
/// Returns [`DbError`] if the connection cannot be created.
pub fn open_in_memory() -> Result<Connection, DbError> {
    Ok(Connection::open_in_memory()?)
}

/// Runs `f` inside an explicit transaction.
///
/// Commits when `f` succeeds and rolls back when it fails, so a failed
/// phase never leaves partial writes behind.
///
/// # Errors
///
/// Returns the error from `f`, or [`DbError`] if `BEGIN`/`COMMIT` fails.
pub fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, DbError>,
) -> Result<T, DbError> {
    conn.execute_batch("BEGIN TRANSACTION;")?;

    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT;")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK;") {
                log::error!("Rollback failed after error ({e}): {rollback_err}");
            }
            Err(e)
        }
    }
}

/// Returns whether `schema.table` exists.
///
/// # Errors
///
/// Returns [`DbError`] if the introspection query fails.
pub fn table_exists(conn: &Connection, schema: &str, table: &str) -> Result<bool, DbError> {
    let count: i64 = conn
        .prepare(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = ? AND table_name = ?",
        )?
        .query_row(duckdb::params![schema, table], |row| row.get(0))?;
    Ok(count > 0)
}
