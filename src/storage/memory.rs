//! In-memory persistence sink
//!
//! Records every batch it receives. Used for dry runs and tests; it can be
//! told to reject the next N batches to exercise failure handling.

use crate::record::Record;
use crate::storage::traits::{PersistenceSink, StorageError, StorageResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Sink that keeps batches in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(String, Vec<Record>)>>,
    failures_remaining: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` batches fail
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// All accepted batches in arrival order
    pub fn batches(&self) -> Vec<(String, Vec<Record>)> {
        self.lock().clone()
    }

    /// Sizes of accepted batches for one destination
    pub fn batch_sizes(&self, destination: &str) -> Vec<usize> {
        self.lock()
            .iter()
            .filter(|(dest, _)| dest == destination)
            .map(|(_, records)| records.len())
            .collect()
    }

    /// All accepted records for one destination, flattened
    pub fn records(&self, destination: &str) -> Vec<Record> {
        self.lock()
            .iter()
            .filter(|(dest, _)| dest == destination)
            .flat_map(|(_, records)| records.iter().cloned())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, Vec<Record>)>> {
        self.batches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn append_batch(&self, destination: &str, records: &[Record]) -> StorageResult<usize> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StorageError::Rejected {
                destination: destination.to_string(),
                message: "simulated failure".to_string(),
            });
        }

        self.lock().push((destination.to_string(), records.to_vec()));
        Ok(records.len())
    }
}
