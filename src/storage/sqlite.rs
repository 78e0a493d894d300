//! SQLite persistence sink
//!
//! Appends batches of records to per-destination tables, creating tables
//! and columns as new fields appear. Each batch is written in a single
//! transaction.

use crate::record::Record;
use crate::storage::schema::{
    add_column, column_spellings, ensure_table, is_reserved, to_sql_value, validate_identifier,
};
use crate::storage::traits::{PersistenceSink, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const MEMORY_URL: &str = "sqlite::memory:";
const SQLITE_PREFIX: &str = "sqlite://";

/// SQLite-backed persistence sink
#[derive(Clone)]
pub struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSink {
    /// Opens a sink from a database URL
    ///
    /// # Arguments
    ///
    /// * `database_url` - `sqlite://path`, `sqlite::memory:`, or a bare path
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Unsupported URL or failed to open
    pub fn open(database_url: &str) -> StorageResult<Self> {
        if database_url == MEMORY_URL {
            return Self::open_in_memory();
        }

        if let Some((scheme, _)) = database_url.split_once("://") {
            if scheme != "sqlite" {
                return Err(StorageError::UnsupportedUrl(database_url.to_string()));
            }
        }

        let path = database_url
            .strip_prefix(SQLITE_PREFIX)
            .unwrap_or(database_url);
        Self::open_path(Path::new(path))
    }

    /// Opens or creates a database file
    pub fn open_path(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better write throughput
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        tracing::info!("Opened SQLite destination at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Verifies the connection answers a trivial query
    pub fn test_connection(&self) -> StorageResult<bool> {
        let conn = self.lock();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(one == 1)
    }

    /// Returns `(table, row count)` for every destination table
    pub fn table_counts(&self) -> StorageResult<Vec<(String, u64)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = Vec::with_capacity(tables.len());
        for table in tables {
            validate_identifier(&table)?;
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                    row.get(0)
                })?;
            counts.push((table, count.max(0) as u64));
        }
        Ok(counts)
    }

    /// Appends records synchronously
    pub fn append_blocking(&self, destination: &str, records: &[Record]) -> StorageResult<usize> {
        let mut conn = self.lock();
        append_records(&mut conn, destination, records)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PersistenceSink for SqliteSink {
    async fn append_batch(&self, destination: &str, records: &[Record]) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let sink = self.clone();
        let destination = destination.to_string();
        let records = records.to_vec();

        tokio::task::spawn_blocking(move || sink.append_blocking(&destination, &records))
            .await
            .map_err(|e| StorageError::Join(e.to_string()))?
    }
}

/// Writes a batch inside one transaction
///
/// Field names match columns case-insensitively, as SQLite does; values go
/// to the column's existing spelling. When one record carries two spellings
/// of the same field, the later one wins. Any failure rolls the whole batch
/// back.
fn append_records(conn: &mut Connection, table: &str, records: &[Record]) -> StorageResult<usize> {
    validate_identifier(table)?;

    let fields: BTreeSet<&str> = records.iter().flat_map(Record::field_names).collect();
    for field in &fields {
        validate_identifier(field)?;
        if is_reserved(field) {
            return Err(StorageError::Rejected {
                destination: table.to_string(),
                message: format!("field '{}' collides with a reserved column", field),
            });
        }
    }

    let tx = conn.transaction()?;

    ensure_table(&tx, table)?;
    let mut columns = column_spellings(&tx, table)?;
    for field in &fields {
        let key = field.to_ascii_lowercase();
        if !columns.contains_key(&key) {
            tracing::debug!("Adding column {}.{}", table, field);
            add_column(&tx, table, field)?;
            columns.insert(key, field.to_string());
        }
    }

    let harvested_at = Utc::now().to_rfc3339();
    for record in records {
        let mut row: BTreeMap<&str, &Value> = BTreeMap::new();
        for (field, value) in record.fields() {
            let column = columns
                .get(&field.to_ascii_lowercase())
                .map_or(field, String::as_str);
            row.insert(column, value);
        }

        let mut names = vec!["harvested_at".to_string()];
        let mut values = vec![SqlValue::Text(harvested_at.clone())];
        for (column, value) in row {
            names.push(format!("\"{column}\""));
            values.push(to_sql_value(value));
        }

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO \"{table}\" ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        );
        tx.execute(&sql, params_from_iter(values))?;
    }

    tx.commit()?;
    Ok(records.len())
}
