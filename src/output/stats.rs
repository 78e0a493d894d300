//! Row statistics for the destination database
//!
//! This module reads per-table row counts from the SQLite sink and prints
//! them for the `stats` command.

use crate::storage::{SqliteSink, StorageResult};

/// Row counts per destination table
#[derive(Debug, Clone, Default)]
pub struct TableStatistics {
    /// Tables and their row counts, sorted by table name
    pub tables: Vec<(String, u64)>,
}

impl TableStatistics {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|(_, count)| count).sum()
    }
}

/// Loads row counts from the sink's database
pub fn load_statistics(sink: &SqliteSink) -> StorageResult<TableStatistics> {
    let mut tables = sink.table_counts()?;
    tables.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(TableStatistics { tables })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &TableStatistics) {
    println!("=== Harvest Statistics ===\n");

    if stats.tables.is_empty() {
        println!("No destination tables yet");
        return;
    }

    let total = stats.total_rows();
    println!("Tables ({}):", stats.tables.len());
    for (table, count) in &stats.tables {
        let percentage = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", table, count, percentage);
    }
    println!();
    println!("Total rows: {}", total);
}
