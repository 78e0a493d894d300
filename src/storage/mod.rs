//! Storage module for persisting harvested records
//!
//! This module handles everything downstream of the record batcher:
//! - The persistence contract batches are written through
//! - SQLite destination tables with on-the-fly column reconciliation
//! - Flat-file exports (raw HTML, GeoJSON, JSON)
//! - An in-memory sink for dry runs and tests

mod files;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use files::{snapshot_identifier, to_feature_collection, FileExporter};
pub use memory::MemorySink;
pub use schema::validate_identifier;
pub use sqlite::SqliteSink;
pub use traits::{PersistenceSink, StorageError, StorageResult};
