//! Sumi-Harvest: a polite record harvester
//!
//! This crate fetches listing and detail pages from a handful of external
//! sources under a shared request policy (delays, retries, proxy and
//! user-agent rotation), turns them into loosely-typed records, and persists
//! those records in batches to SQLite tables and flat files.

pub mod batch;
pub mod config;
pub mod fetch;
pub mod harvest;
pub mod output;
pub mod record;
pub mod sources;
pub mod storage;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// The final flush failed; `summaries` still reports what each source did
    #[error("Failed to persist {pending} buffered records: {source}")]
    Persistence {
        pending: usize,
        source: storage::StorageError,
        summaries: Vec<output::RunSummary>,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] sources::ParseError),

    #[error("Source '{source_name}' requires {what}")]
    MissingInput {
        source_name: &'static str,
        what: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use batch::RecordBatcher;
pub use config::{Config, SharedConfig};
pub use fetch::{FetchError, FetchRequest, FetchResponse, Fetcher, ProxyPool, RequestPolicy};
pub use record::Record;
pub use sources::{CrawlDriver, CrawlError, CrawlRequest, SourceKind};
pub use storage::{PersistenceSink, SqliteSink};
