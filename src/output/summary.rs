//! Per-source run summary

use crate::batch::BatchStats;
use crate::sources::CrawlError;
use serde::Serialize;

/// What one source did during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Source name
    pub source: String,

    /// Destination table
    pub destination: String,

    /// Records the crawl yielded
    pub records_produced: u64,

    /// Items dropped because they were malformed or their detail page failed
    pub records_skipped: u64,

    /// Listing pages lost to fetch, render or parse failures
    pub pages_failed: u64,

    /// Successful flushes into the destination
    pub flushes: u64,

    /// Records accepted by the persistence sink
    pub records_persisted: u64,

    /// Records still buffered after the final flush
    pub pending: usize,

    /// Whether the crawl was interrupted before it finished
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            ..Default::default()
        }
    }

    /// Counts a crawl failure against the page or item tallies
    pub fn record_failure(&mut self, error: &CrawlError) {
        if error.is_page_level() {
            self.pages_failed += 1;
        } else {
            self.records_skipped += 1;
        }
    }

    /// Copies the batcher's counters for this source's destination
    pub fn apply_batch_stats(&mut self, stats: BatchStats) {
        self.flushes = stats.flushes;
        self.records_persisted = stats.records_flushed;
        self.pending = stats.pending;
    }
}

/// Prints run summaries to stdout
pub fn print_run_summary(summaries: &[RunSummary]) {
    println!("=== Harvest Summary ===\n");

    for summary in summaries {
        let status = if summary.cancelled { " (cancelled)" } else { "" };
        println!("{} → {}{}", summary.source, summary.destination, status);
        println!("  Records produced: {}", summary.records_produced);
        println!("  Records persisted: {} in {} flushes", summary.records_persisted, summary.flushes);
        if summary.records_skipped > 0 || summary.pages_failed > 0 {
            println!(
                "  Skipped: {} items, {} pages",
                summary.records_skipped, summary.pages_failed
            );
        }
        if summary.pending > 0 {
            println!("  Still pending: {}", summary.pending);
        }
        println!();
    }

    let produced: u64 = summaries.iter().map(|s| s.records_produced).sum();
    let persisted: u64 = summaries.iter().map(|s| s.records_persisted).sum();
    println!("Total: {} produced, {} persisted", produced, persisted);
}
