//! Row-level index mutation: upsert and delete inside a caller-owned
//! transaction.

use mddb_core::config::SqlColumn;
use mddb_core::document::SqlValue;
use mddb_core::errors::StorageError;
use rusqlite::types::Value as DbValue;
use rusqlite::Transaction;

/// One row of the index table, base columns plus projected user values.
#[derive(Debug)]
pub struct IndexRow<'a> {
    pub id: &'a str,
    pub short_id: &'a str,
    pub path: &'a str,
    pub mtime_ns: i64,
    pub size_bytes: i64,
    pub title: &'a str,
    /// User column values in declaration order.
    pub user: Vec<SqlValue>,
}

fn to_db_value(v: &SqlValue) -> DbValue {
    match v {
        SqlValue::Null => DbValue::Null,
        SqlValue::Integer(n) => DbValue::Integer(*n),
        SqlValue::Real(f) => DbValue::Real(*f),
        SqlValue::Text(s) => DbValue::Text(s.clone()),
        SqlValue::Blob(b) => DbValue::Blob(b.clone()),
    }
}

/// Insert or replace one row.
pub fn upsert_row(
    tx: &Transaction<'_>,
    table: &str,
    user_columns: &[SqlColumn],
    row: &IndexRow<'_>,
) -> Result<(), StorageError> {
    if row.user.len() != user_columns.len() {
        return Err(StorageError::sqlite(format!(
            "doc {}: projected {} user column value(s), schema declares {}",
            row.id,
            row.user.len(),
            user_columns.len()
        )));
    }

    let mut columns = String::from("id, short_id, path, mtime_ns, size_bytes, title");
    let mut placeholders = String::from("?1, ?2, ?3, ?4, ?5, ?6");
    for (i, col) in user_columns.iter().enumerate() {
        columns.push_str(", ");
        columns.push_str(&col.name);
        placeholders.push_str(&format!(", ?{}", i + 7));
    }
    let sql = format!("INSERT OR REPLACE INTO {table} ({columns}) VALUES ({placeholders})");

    let mut stmt = tx
        .prepare_cached(&sql)
        .map_err(|e| StorageError::sqlite(e.to_string()))?;

    let mut params: Vec<DbValue> = Vec::with_capacity(6 + row.user.len());
    params.push(DbValue::Text(row.id.to_string()));
    params.push(DbValue::Text(row.short_id.to_string()));
    params.push(DbValue::Text(row.path.to_string()));
    params.push(DbValue::Integer(row.mtime_ns));
    params.push(DbValue::Integer(row.size_bytes));
    params.push(DbValue::Text(row.title.to_string()));
    params.extend(row.user.iter().map(to_db_value));

    stmt.execute(rusqlite::params_from_iter(params))
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    Ok(())
}

/// Delete a row by id. Absence is not an error; replay hits rows that
/// were already removed.
pub fn delete_row(tx: &Transaction<'_>, table: &str, id: &str) -> Result<bool, StorageError> {
    let mut stmt = tx
        .prepare_cached(&format!("DELETE FROM {table} WHERE id = ?1"))
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    let n = stmt
        .execute(rusqlite::params![id])
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    Ok(n > 0)
}
