//! Index table shape: fixed base columns, user extensions, DDL
//! generation, and the fingerprint stored in `user_version`.

use mddb_core::config::{SqlColumn, SqlIndex, SqlSchema, SqlType};
use mddb_core::errors::StorageError;
use mddb_core::fingerprint::schema_fingerprint;
use rusqlite::Connection;
use tracing::debug;

/// Table names are caller-configured but constrained to a shape that
/// can be interpolated into SQL safely.
pub fn validate_table_name(table: &str) -> Result<(), StorageError> {
    let ok = !table.is_empty()
        && table
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b == b'_');
    if !ok {
        return Err(StorageError::InvalidTableName {
            table: table.to_string(),
        });
    }
    Ok(())
}

/// The fixed base columns, in table order.
pub fn base_columns() -> Vec<SqlColumn> {
    let mut id = SqlColumn::new("id", SqlType::Text);
    id.primary_key = true;
    vec![
        id,
        SqlColumn::new("short_id", SqlType::Text).not_null(),
        SqlColumn::new("path", SqlType::Text).not_null(),
        SqlColumn::new("mtime_ns", SqlType::Integer).not_null(),
        SqlColumn::new("size_bytes", SqlType::Integer).not_null(),
        SqlColumn::new("title", SqlType::Text).not_null(),
    ]
}

/// Base columns followed by the user columns, in declaration order.
pub fn full_columns(schema: &SqlSchema) -> Vec<SqlColumn> {
    let mut cols = base_columns();
    cols.extend(schema.columns.iter().cloned());
    cols
}

/// The required short_id index followed by the user indexes.
pub fn full_indexes(schema: &SqlSchema) -> Vec<SqlIndex> {
    let mut idxs = vec![SqlIndex::new(["short_id"])];
    idxs.extend(schema.indexes.iter().cloned());
    idxs
}

/// Fingerprint of the complete layout for this table and schema.
pub fn fingerprint(table: &str, schema: &SqlSchema) -> u32 {
    schema_fingerprint(table, &full_columns(schema), &full_indexes(schema))
}

fn index_name(table: &str, index: &SqlIndex) -> String {
    format!("idx_{}_{}", table, index.columns.join("_"))
}

/// DDL for the table and all its indexes.
pub fn create_ddl(table: &str, schema: &SqlSchema) -> String {
    let mut ddl = String::new();
    ddl.push_str(&format!("CREATE TABLE IF NOT EXISTS {table} (\n"));
    let cols = full_columns(schema);
    for (i, col) in cols.iter().enumerate() {
        ddl.push_str("    ");
        ddl.push_str(&col.name);
        ddl.push(' ');
        ddl.push_str(col.ty.sql());
        if col.primary_key {
            ddl.push_str(" PRIMARY KEY");
        }
        if col.not_null {
            ddl.push_str(" NOT NULL");
        }
        if i + 1 < cols.len() {
            ddl.push(',');
        }
        ddl.push('\n');
    }
    ddl.push_str(");\n");
    for index in full_indexes(schema) {
        let unique = if index.unique { "UNIQUE " } else { "" };
        ddl.push_str(&format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {}({});\n",
            unique,
            index_name(table, &index),
            table,
            index.columns.join(", ")
        ));
    }
    ddl
}

/// Create the table and indexes if missing.
pub fn create_schema(
    conn: &Connection,
    table: &str,
    schema: &SqlSchema,
) -> Result<(), StorageError> {
    conn.execute_batch(&create_ddl(table, schema))
        .map_err(|e| StorageError::sqlite(format!("create schema: {e}")))
}

/// Drop the table; its indexes go with it.
pub fn drop_schema(conn: &Connection, table: &str) -> Result<(), StorageError> {
    debug!(table, "dropping index table");
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))
        .map_err(|e| StorageError::sqlite(format!("drop schema: {e}")))
}

/// Read the stored schema fingerprint.
pub fn read_user_version(conn: &Connection) -> Result<u32, StorageError> {
    let v: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    Ok(v as u32)
}

/// Store a fresh schema fingerprint.
pub fn write_user_version(conn: &Connection, fingerprint: u32) -> Result<(), StorageError> {
    // user_version is a signed 32-bit field; the fingerprint survives
    // the round trip through the cast.
    conn.pragma_update(None, "user_version", fingerprint as i32)
        .map_err(|e| StorageError::sqlite(e.to_string()))
}
