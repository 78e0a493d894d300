//! Per-destination record buffering
//!
//! Records are grouped by destination and handed to the persistence sink
//! once a buffer reaches the batch size, or when the run flushes
//! everything at the end. A buffer is cleared only after the sink accepts
//! it, so a failed flush leaves every record pending.

use crate::record::Record;
use crate::storage::{PersistenceSink, StorageError, StorageResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Buffer and counters for one destination
#[derive(Debug, Default)]
struct DestinationBuffer {
    pending: AsyncMutex<Vec<Record>>,
    flushes: AtomicU64,
    records_flushed: AtomicU64,
}

/// Flush counters for one destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub flushes: u64,
    pub records_flushed: u64,
    pub pending: usize,
}

/// Failure to flush one or more destinations
#[derive(Debug)]
pub struct FlushFailure {
    /// Destinations whose flush failed, with the sink's error
    pub failed: Vec<(String, StorageError)>,
    /// Records still buffered across all failed destinations
    pub pending: usize,
}

impl fmt::Display for FlushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.failed.iter().map(|(name, _)| name.as_str()).collect();
        write!(f, "{} records left unflushed in {}", self.pending, names.join(", "))
    }
}

/// Groups records by destination and flushes them in batches
pub struct RecordBatcher {
    sink: Arc<dyn PersistenceSink>,
    batch_size: usize,
    buffers: Mutex<HashMap<String, Arc<DestinationBuffer>>>,
}

impl RecordBatcher {
    /// Creates a batcher
    ///
    /// # Arguments
    ///
    /// * `sink` - Where full batches are written
    /// * `batch_size` - Buffer length that triggers a flush (at least 1)
    pub fn new(sink: Arc<dyn PersistenceSink>, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Appends a record, flushing the destination if its buffer is full
    ///
    /// The record is buffered before any flush is attempted; if that flush
    /// fails the record stays pending with the rest of the buffer.
    ///
    /// # Returns
    ///
    /// The number of records flushed by this call (0 if no flush happened)
    pub async fn add(&self, destination: &str, record: Record) -> StorageResult<usize> {
        let buffer = self.buffer(destination);
        let mut pending = buffer.pending.lock().await;
        pending.push(record);

        if pending.len() >= self.batch_size {
            return self.flush_locked(destination, &buffer, &mut pending).await;
        }
        Ok(0)
    }

    /// Flushes one destination
    ///
    /// Flushing an empty or unknown destination is a no-op and does not
    /// touch the sink.
    pub async fn flush(&self, destination: &str) -> StorageResult<usize> {
        let Some(buffer) = self.existing_buffer(destination) else {
            return Ok(0);
        };
        let mut pending = buffer.pending.lock().await;
        self.flush_locked(destination, &buffer, &mut pending).await
    }

    /// Flushes every destination with buffered records
    ///
    /// Every destination is attempted even if an earlier one fails.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Total records flushed
    /// * `Err(FlushFailure)` - At least one destination failed; its records
    ///   remain buffered
    pub async fn flush_all(&self) -> Result<usize, FlushFailure> {
        let destinations: Vec<(String, Arc<DestinationBuffer>)> = self
            .buffers()
            .iter()
            .map(|(name, buffer)| (name.clone(), Arc::clone(buffer)))
            .collect();

        let mut flushed = 0;
        let mut failed = Vec::new();
        let mut still_pending = 0;

        for (destination, buffer) in destinations {
            let mut pending = buffer.pending.lock().await;
            match self.flush_locked(&destination, &buffer, &mut pending).await {
                Ok(count) => flushed += count,
                Err(error) => {
                    still_pending += pending.len();
                    failed.push((destination, error));
                }
            }
        }

        if failed.is_empty() {
            Ok(flushed)
        } else {
            Err(FlushFailure {
                failed,
                pending: still_pending,
            })
        }
    }

    /// Number of records buffered for a destination
    pub async fn pending(&self, destination: &str) -> usize {
        let Some(buffer) = self.existing_buffer(destination) else {
            return 0;
        };
        let pending = buffer.pending.lock().await;
        pending.len()
    }

    /// Flush counters for a destination
    pub async fn stats(&self, destination: &str) -> BatchStats {
        let Some(buffer) = self.existing_buffer(destination) else {
            return BatchStats::default();
        };
        let pending = {
            let guard = buffer.pending.lock().await;
            guard.len()
        };
        BatchStats {
            flushes: buffer.flushes.load(Ordering::Relaxed),
            records_flushed: buffer.records_flushed.load(Ordering::Relaxed),
            pending,
        }
    }

    /// Writes a locked buffer to the sink and clears it on success
    async fn flush_locked(
        &self,
        destination: &str,
        buffer: &DestinationBuffer,
        pending: &mut Vec<Record>,
    ) -> StorageResult<usize> {
        if pending.is_empty() {
            return Ok(0);
        }

        match self.sink.append_batch(destination, pending).await {
            Ok(_) => {
                let count = pending.len();
                pending.clear();
                buffer.flushes.fetch_add(1, Ordering::Relaxed);
                buffer
                    .records_flushed
                    .fetch_add(count as u64, Ordering::Relaxed);
                tracing::info!("Inserted {} rows into {}", count, destination);
                Ok(count)
            }
            Err(error) => {
                tracing::error!(
                    "Flush of {} records into {} failed, keeping them buffered: {}",
                    pending.len(),
                    destination,
                    error
                );
                Err(error)
            }
        }
    }

    /// Returns the buffer for a destination, creating it on first use
    fn buffer(&self, destination: &str) -> Arc<DestinationBuffer> {
        let mut buffers = self.buffers();
        Arc::clone(buffers.entry(destination.to_string()).or_default())
    }

    fn existing_buffer(&self, destination: &str) -> Option<Arc<DestinationBuffer>> {
        self.buffers().get(destination).cloned()
    }

    fn buffers(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<DestinationBuffer>>> {
        self.buffers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
