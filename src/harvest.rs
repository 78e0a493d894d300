//! Run orchestration
//!
//! Drives one or more crawl drivers concurrently, feeds their records into a
//! shared [`RecordBatcher`], and flushes every buffer once all drivers have
//! finished or the run was cancelled. Page and item failures are counted
//! and logged; only a failed final flush fails the run.

use crate::batch::RecordBatcher;
use crate::output::RunSummary;
use crate::record::Record;
use crate::sources::{CrawlDriver, CrawlRequest};
use crate::storage::{FileExporter, StorageError};
use crate::{HarvestError, Result};
use futures::future::join_all;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Optional exports performed at the end of a run
#[derive(Debug, Clone, Default)]
pub struct HarvestOptions {
    /// Writes GeoJSON layers for sources with point geometry
    pub exporter: Option<Arc<FileExporter>>,
    /// Directory receiving `<destination>.json` dumps of every record
    pub export_json: Option<PathBuf>,
}

impl HarvestOptions {
    fn keeps_records(&self, driver: &dyn CrawlDriver) -> bool {
        let geojson = driver.exports_geometry()
            && self
                .exporter
                .as_ref()
                .is_some_and(|exporter| exporter.geojson_enabled());
        geojson || self.export_json.is_some()
    }
}

/// Result of crawling one source
#[derive(Debug, Default)]
pub struct SourceOutcome {
    pub summary: RunSummary,
    /// Produced records, kept only when an export needs them
    pub records: Vec<Record>,
}

/// Crawls one source into the batcher until it finishes or is cancelled
///
/// Cancellation takes effect at the next suspension point; whatever the
/// driver was waiting on is dropped and already buffered records stay in
/// the batcher for the final flush.
pub async fn harvest_source(
    driver: &dyn CrawlDriver,
    request: &CrawlRequest,
    batcher: &RecordBatcher,
    cancel: &CancellationToken,
    keep_records: bool,
) -> SourceOutcome {
    let mut outcome = SourceOutcome {
        summary: RunSummary::new(driver.name(), driver.destination()),
        records: Vec::new(),
    };
    tracing::info!("{}: crawl started", driver.name());

    let mut stream = driver.crawl(request);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("{}: cancelled", driver.name());
                outcome.summary.cancelled = true;
                break;
            }
            next = stream.next() => next,
        };
        let Some(result) = next else {
            break;
        };

        match result {
            Ok(record) => {
                outcome.summary.records_produced += 1;
                if keep_records {
                    outcome.records.push(record.clone());
                }
                if let Err(e) = batcher.add(driver.destination(), record).await {
                    tracing::warn!(
                        "{}: flush into {} failed, records stay buffered: {}",
                        driver.name(),
                        driver.destination(),
                        e
                    );
                }
            }
            Err(error) => {
                tracing::warn!("{}: {}", driver.name(), error);
                outcome.summary.record_failure(&error);
            }
        }
    }

    tracing::info!(
        "{}: crawl finished, {} records produced, {} skipped, {} pages failed",
        driver.name(),
        outcome.summary.records_produced,
        outcome.summary.records_skipped,
        outcome.summary.pages_failed
    );
    outcome
}

/// Crawls every driver concurrently, then flushes and exports
///
/// # Returns
///
/// * `Ok(Vec<RunSummary>)` - One summary per driver, in driver order
/// * `Err(HarvestError::Persistence)` - The final flush left records unsaved;
///   the error carries the summaries
/// * `Err(HarvestError::Storage)` - An export could not be written
pub async fn harvest_all(
    drivers: &[Box<dyn CrawlDriver>],
    request: &CrawlRequest,
    batcher: &RecordBatcher,
    cancel: &CancellationToken,
    options: &HarvestOptions,
) -> Result<Vec<RunSummary>> {
    let runs = drivers.iter().map(|driver| {
        let keep = options.keeps_records(driver.as_ref());
        harvest_source(driver.as_ref(), request, batcher, cancel, keep)
    });
    let outcomes = join_all(runs).await;

    let flushed = batcher.flush_all().await;

    let mut summaries = Vec::with_capacity(outcomes.len());
    let mut export_error = None;
    for (driver, outcome) in drivers.iter().zip(outcomes) {
        let mut summary = outcome.summary;
        summary.apply_batch_stats(batcher.stats(driver.destination()).await);
        summaries.push(summary);

        if let Err(e) = export(driver.as_ref(), outcome.records, options).await {
            tracing::error!("{}: export failed: {}", driver.name(), e);
            export_error.get_or_insert(e);
        }
    }

    match flushed {
        Ok(count) => tracing::info!("Final flush wrote {} records", count),
        Err(failure) => {
            tracing::error!("Final flush failed: {}", failure);
            if let Some((_, source)) = failure.failed.into_iter().next() {
                return Err(HarvestError::Persistence {
                    pending: failure.pending,
                    source,
                    summaries,
                });
            }
        }
    }

    match export_error {
        Some(e) => Err(e.into()),
        None => Ok(summaries),
    }
}

/// Writes the end-of-run exports for one source
async fn export(
    driver: &dyn CrawlDriver,
    records: Vec<Record>,
    options: &HarvestOptions,
) -> std::result::Result<(), StorageError> {
    if records.is_empty() {
        return Ok(());
    }

    let geojson = options
        .exporter
        .clone()
        .filter(|exporter| driver.exports_geometry() && exporter.geojson_enabled());
    let json_path = options
        .export_json
        .as_ref()
        .map(|dir| dir.join(format!("{}.json", driver.destination())));
    let destination = driver.destination().to_string();

    let written = tokio::task::spawn_blocking(move || {
        let mut written = Vec::new();
        if let Some(exporter) = geojson {
            written.extend(exporter.save_geojson(&destination, &records)?);
        }
        if let Some(path) = json_path {
            written.push(FileExporter::default().export_records(&path, &records)?);
        }
        Ok::<_, StorageError>(written)
    })
    .await
    .map_err(|e| StorageError::Join(e.to_string()))??;

    for path in written {
        tracing::info!("{}: exported {}", driver.name(), path.display());
    }
    Ok(())
}
