//! Column reconciliation helpers for dynamically shaped tables
//!
//! Destination tables are created on first write and grow a column for
//! every field name seen later. Names are validated before they are quoted
//! into SQL.

use crate::storage::traits::{StorageError, StorageResult};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Columns every destination table carries besides the record fields
pub const RESERVED_COLUMNS: [&str; 2] = ["id", "harvested_at"];

/// Whether a field would land in one of the reserved columns
///
/// SQLite matches column names case-insensitively, so `ID` is `id`.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_COLUMNS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Checks that a table or column name is a plain SQL identifier
pub fn validate_identifier(name: &str) -> StorageResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');

    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

/// Creates the destination table if it does not exist
pub fn ensure_table(conn: &Connection, table: &str) -> StorageResult<()> {
    validate_identifier(table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            harvested_at TEXT NOT NULL
        );"
    ))?;
    Ok(())
}

/// Lists the column names of a table
pub fn table_columns(conn: &Connection, table: &str) -> StorageResult<HashSet<String>> {
    validate_identifier(table)?;
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(columns)
}

/// Maps the lowercased name of every column to its declared spelling
pub fn column_spellings(conn: &Connection, table: &str) -> StorageResult<HashMap<String, String>> {
    Ok(table_columns(conn, table)?
        .into_iter()
        .map(|column| (column.to_ascii_lowercase(), column))
        .collect())
}

/// Adds a column without a declared type so any value can be stored
pub fn add_column(conn: &Connection, table: &str, column: &str) -> StorageResult<()> {
    validate_identifier(table)?;
    validate_identifier(column)?;
    conn.execute_batch(&format!("ALTER TABLE \"{table}\" ADD COLUMN \"{column}\";"))?;
    Ok(())
}

/// Converts a JSON value to the SQLite value stored for it
///
/// Scalars are stored natively; arrays and objects as JSON text.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}
