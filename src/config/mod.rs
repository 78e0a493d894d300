//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and holds the process-wide handle to the active configuration.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Retries per request: {}", config.request_policy.max_retries);
//! ```

mod parser;
mod types;
mod validation;

use std::sync::{Arc, RwLock};

// Re-export types
pub use types::{
    ApiKeysConfig, Config, ProxyConfig, RendererConfig, RequestPolicyConfig, StorageConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{apply_env_overrides, compute_config_hash, load_config, load_config_with_hash};

/// Process-wide handle to the active configuration
///
/// A `Config` is never mutated once loaded. Reloading builds a new value and
/// swaps it in; components that already hold an `Arc<Config>` keep the
/// snapshot they started with.
#[derive(Debug)]
pub struct SharedConfig {
    current: RwLock<Arc<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Returns a snapshot of the active configuration
    pub fn current(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the active configuration, returning the previous one
    pub fn replace(&self, config: Config) -> Arc<Config> {
        let next = Arc::new(config);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
