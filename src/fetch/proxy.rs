//! Proxy pool with cooldown-based health tracking
//!
//! Proxies that fail are excluded from selection until their cooldown
//! expires. Selection never blocks: when nothing is available the caller
//! simply proceeds without a proxy.

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A proxy address and the time until which it is excluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEntry {
    pub address: String,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl ProxyEntry {
    fn new(address: String) -> Self {
        Self {
            address,
            blocked_until: None,
        }
    }

    /// Whether the proxy can be selected at `now`
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.map_or(true, |until| until <= now)
    }
}

/// Rotating proxy pool
#[derive(Debug, Default)]
pub struct ProxyPool {
    entries: Mutex<Vec<ProxyEntry>>,
}

impl ProxyPool {
    /// Creates a pool from a list of addresses, dropping blanks and duplicates
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool = Self::default();
        for address in addresses {
            pool.add_proxy(address);
        }
        pool
    }

    /// Loads a pool from a file with one proxy URI per line
    ///
    /// A missing file yields an empty pool; blank lines are skipped.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the proxy list
    ///
    /// # Returns
    ///
    /// * `Ok(ProxyPool)` - The loaded pool (possibly empty)
    /// * `Err(std::io::Error)` - The file exists but could not be read
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "Proxy file {} not found, continuing without proxies",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let pool = Self::new(content.lines());
        tracing::info!("Loaded {} proxies from {}", pool.len(), path.display());
        Ok(pool)
    }

    /// Returns a uniformly random proxy that is not cooling down
    pub fn next_proxy(&self) -> Option<String> {
        self.next_proxy_at(Utc::now())
    }

    pub(crate) fn next_proxy_at(&self, now: DateTime<Utc>) -> Option<String> {
        let entries = self.entries();
        let available: Vec<&ProxyEntry> = entries.iter().filter(|e| e.is_available(now)).collect();
        available
            .choose(&mut rand::rng())
            .map(|entry| entry.address.clone())
    }

    /// Puts a proxy on cooldown for `cooldown` from now
    ///
    /// Repeated calls overwrite the previous deadline. Returns `false` if the
    /// proxy is not part of the pool.
    pub fn mark_failure(&self, proxy: &str, cooldown: Duration) -> bool {
        self.mark_failure_at(proxy, cooldown, Utc::now())
    }

    pub(crate) fn mark_failure_at(&self, proxy: &str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.iter_mut().find(|e| e.address == proxy) else {
            return false;
        };

        let cooldown = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX);
        entry.blocked_until = Some(now.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC));
        tracing::warn!("Proxy {} put on cooldown until {:?}", proxy, entry.blocked_until);
        true
    }

    /// Adds a proxy if it is not already present
    ///
    /// Returns `true` if the proxy was added.
    pub fn add_proxy(&self, proxy: impl Into<String>) -> bool {
        let address = proxy.into().trim().to_string();
        if address.is_empty() {
            return false;
        }

        let mut entries = self.entries();
        if entries.iter().any(|e| e.address == address) {
            return false;
        }
        entries.push(ProxyEntry::new(address));
        true
    }

    /// Number of proxies in the pool, available or not
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Number of proxies currently selectable
    pub fn available_count(&self) -> usize {
        let now = Utc::now();
        self.entries().iter().filter(|e| e.is_available(now)).count()
    }

    /// Returns a copy of the current entries
    pub fn snapshot(&self) -> Vec<ProxyEntry> {
        self.entries().clone()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<ProxyEntry>> {
        // Entries stay consistent even if a holder panicked mid-update
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
