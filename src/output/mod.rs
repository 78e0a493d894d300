//! Output module for reporting harvest results
//!
//! This module handles:
//! - Per-source run summaries printed at the end of a crawl
//! - Row statistics of the destination database

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, TableStatistics};
pub use summary::{print_run_summary, RunSummary};
