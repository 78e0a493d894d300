//! Record batching between sources and the persistence sink

mod batcher;

pub use batcher::{BatchStats, FlushFailure, RecordBatcher};
