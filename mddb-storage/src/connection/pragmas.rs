//! PRAGMA configuration applied to the index connection.
//!
//! WAL journal, FULL sync, 256MB mmap, 20MB cache, in-memory temp
//! store, 10s busy_timeout.

use mddb_core::errors::StorageError;
use rusqlite::Connection;

/// Apply the fixed pragma set. The store holds exactly one connection,
/// so these apply to every statement it ever runs.
pub fn apply_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA busy_timeout = 10000;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = FULL;
        PRAGMA mmap_size = 268435456;
        PRAGMA cache_size = -20000;
        PRAGMA temp_store = MEMORY;
        ",
    )
    .map_err(|e| StorageError::sqlite(e.to_string()))?;
    Ok(())
}
