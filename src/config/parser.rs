use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variables that override the database URL, highest priority first
const DATABASE_URL_VARS: [&str; 2] = ["HARVEST_DATABASE_URL", "POSTGRES_DSN"];

/// Environment variable holding the Baidu LBS access key
const BAIDU_KEY_VAR: &str = "BAIDU_LBS_AK";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied after parsing and before validation,
/// so an override can supply a value the file leaves invalid.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Batch size: {}", config.storage.batch_size);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    validate(&config)?;

    Ok(config)
}

/// Applies environment overrides using the given variable lookup
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = DATABASE_URL_VARS
        .iter()
        .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
    {
        tracing::debug!("Database URL overridden from environment");
        config.storage.database_url = url;
    }

    if let Some(key) = lookup(BAIDU_KEY_VAR).filter(|v| !v.is_empty()) {
        config.api_keys.baidu_map = Some(key);
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be correlated with the settings they used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
