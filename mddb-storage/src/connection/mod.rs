//! Connection management: one configured connection per store.

pub mod pragmas;

use std::path::Path;

use mddb_core::errors::StorageError;
use rusqlite::Connection;
use tracing::debug;

use self::pragmas::apply_pragmas;

/// Open the index database at the given path and apply pragmas.
/// Schema creation is the caller's concern; the layout depends on the
/// fingerprint check.
pub fn open_index(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path).map_err(|e| StorageError::sqlite(e.to_string()))?;
    apply_pragmas(&conn)?;
    debug!(path = %path.display(), "opened index database");
    Ok(conn)
}

/// Open an in-memory index (for testing).
pub fn open_in_memory() -> Result<Connection, StorageError> {
    let conn = Connection::open_in_memory().map_err(|e| StorageError::sqlite(e.to_string()))?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

/// Execute a write operation inside a BEGIN IMMEDIATE transaction.
/// IMMEDIATE takes the SQLite write lock up front, so a busy database
/// surfaces here instead of mid-transaction. Generic over the error
/// type so callers can thread their own through the closure.
pub fn with_immediate_transaction<F, T, E>(conn: &Connection, f: F) -> Result<T, E>
where
    F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, E>,
    E: From<StorageError>,
{
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| E::from(StorageError::sqlite(format!("begin immediate: {e}"))))?;

    // The transaction is already open; unchecked_transaction wraps it
    // for auto-rollback without issuing another BEGIN.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| E::from(StorageError::sqlite(format!("wrap transaction: {e}"))))?;

    let result = f(&tx)?;

    tx.commit()
        .map_err(|e| E::from(StorageError::sqlite(format!("commit: {e}"))))?;

    Ok(result)
}
