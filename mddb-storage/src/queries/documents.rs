//! Document row lookups: by id, by prefix, paged listing.

use mddb_core::document::DocumentSummary;
use mddb_core::errors::StorageError;
use rusqlite::{params, Connection, Row};

const SUMMARY_COLUMNS: &str = "id, short_id, path, mtime_ns, size_bytes, title";

fn read_summary(row: &Row<'_>) -> rusqlite::Result<DocumentSummary> {
    Ok(DocumentSummary {
        id: row.get(0)?,
        short_id: row.get(1)?,
        path: row.get(2)?,
        mtime_ns: row.get(3)?,
        size_bytes: row.get(4)?,
        title: row.get(5)?,
    })
}

/// The stored relative path for an id, if indexed.
pub fn path_by_id(
    conn: &Connection,
    table: &str,
    id: &str,
) -> Result<Option<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!("SELECT path FROM {table} WHERE id = ?1"))
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    let mut rows = stmt
        .query(params![id])
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    match rows.next() {
        Ok(Some(row)) => row
            .get(0)
            .map(Some)
            .map_err(|e| StorageError::sqlite(e.to_string())),
        Ok(None) => Ok(None),
        Err(e) => Err(StorageError::sqlite(e.to_string())),
    }
}

/// Escape `_`, `%` and `\` so a prefix matches literally under
/// `LIKE … ESCAPE '\'`.
pub fn escape_like(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '_' | '%' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Rows whose id or short_id begins with `prefix`, ordered by id,
/// capped at `limit`.
pub fn by_prefix(
    conn: &Connection,
    table: &str,
    prefix: &str,
    limit: usize,
) -> Result<Vec<DocumentSummary>, StorageError> {
    let pattern = format!("{}%", escape_like(prefix));
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM {table}
         WHERE id LIKE ?1 ESCAPE '\\' OR short_id LIKE ?1 ESCAPE '\\'
         ORDER BY id LIMIT ?2"
    );
    let mut stmt = conn
        .prepare_cached(&sql)
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    let rows = stmt
        .query_map(params![pattern, limit as i64], read_summary)
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| StorageError::sqlite(e.to_string()))
}

/// A page of summary rows ordered by id.
pub fn list_page(
    conn: &Connection,
    table: &str,
    offset: usize,
    limit: usize,
) -> Result<Vec<DocumentSummary>, StorageError> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM {table} ORDER BY id LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn
        .prepare_cached(&sql)
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64, offset as i64], read_summary)
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| StorageError::sqlite(e.to_string()))
}

/// Every summary row. The incremental reindex reconciles against this.
pub fn all_summaries(conn: &Connection, table: &str) -> Result<Vec<DocumentSummary>, StorageError> {
    let sql = format!("SELECT {SUMMARY_COLUMNS} FROM {table} ORDER BY id");
    let mut stmt = conn
        .prepare_cached(&sql)
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    let rows = stmt
        .query_map([], read_summary)
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| StorageError::sqlite(e.to_string()))
}

/// Total row count.
pub fn count_rows(conn: &Connection, table: &str) -> Result<usize, StorageError> {
    let n: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    Ok(n as usize)
}

/// True when a row exists for this id.
pub fn id_exists(conn: &Connection, table: &str, id: &str) -> Result<bool, StorageError> {
    let n: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE id = ?1"),
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    Ok(n > 0)
}
