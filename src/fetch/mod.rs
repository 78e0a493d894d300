//! Polite, resilient fetching
//!
//! This module contains everything between a source and the network:
//! - The immutable request policy (timeouts, delays, retry schedule)
//! - User agent rotation
//! - The proxy pool with per-proxy cooldowns
//! - The fetcher that ties them together

mod fetcher;
mod identity;
mod policy;
mod proxy;

pub use fetcher::{ConnectionSlot, FetchError, FetchRequest, FetchResponse, FetchResult, Fetcher};
pub use identity::UserAgentRotator;
pub use policy::{RequestPolicy, RetryPolicy};
pub use proxy::{ProxyEntry, ProxyPool};
