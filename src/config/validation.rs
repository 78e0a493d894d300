use crate::config::types::{Config, ProxyConfig, RequestPolicyConfig, StorageConfig, UserAgentConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_request_policy(&config.request_policy)?;
    validate_proxy_config(&config.proxy)?;
    validate_user_agents(&config.user_agents)?;
    validate_storage_config(&config.storage)?;

    if !config.renderer.wait_seconds.is_finite() || config.renderer.wait_seconds < 0.0 {
        return Err(ConfigError::Validation(format!(
            "renderer wait-seconds must be >= 0, got {}",
            config.renderer.wait_seconds
        )));
    }

    Ok(())
}

/// Validates the request policy bounds
fn validate_request_policy(policy: &RequestPolicyConfig) -> Result<(), ConfigError> {
    if !policy.min_delay.is_finite() || policy.min_delay < 0.0 {
        return Err(ConfigError::Validation(format!(
            "min-delay must be >= 0, got {}",
            policy.min_delay
        )));
    }

    if !policy.max_delay.is_finite() || policy.max_delay < policy.min_delay {
        return Err(ConfigError::Validation(format!(
            "max-delay must be >= min-delay ({}), got {}",
            policy.min_delay, policy.max_delay
        )));
    }

    if !policy.timeout.is_finite() || policy.timeout <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "timeout must be > 0, got {}",
            policy.timeout
        )));
    }

    if !policy.backoff_multiplier.is_finite() || policy.backoff_multiplier <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "backoff-multiplier must be > 0, got {}",
            policy.backoff_multiplier
        )));
    }

    if policy.max_concurrent_requests < 1 || policy.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-requests must be between 1 and 100, got {}",
            policy.max_concurrent_requests
        )));
    }

    Ok(())
}

fn validate_proxy_config(proxy: &ProxyConfig) -> Result<(), ConfigError> {
    if proxy.enabled && proxy.pool_file.is_none() {
        return Err(ConfigError::Validation(
            "proxy.enabled requires a pool-file".to_string(),
        ));
    }
    Ok(())
}

fn validate_user_agents(agents: &UserAgentConfig) -> Result<(), ConfigError> {
    if agents.pool.is_empty() {
        return Err(ConfigError::Validation(
            "user-agents pool must contain at least one entry".to_string(),
        ));
    }

    if agents.pool.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents pool cannot contain blank entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.database_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-url cannot be empty".to_string(),
        ));
    }

    if storage.database_url.starts_with("postgres://")
        || storage.database_url.starts_with("postgresql://")
    {
        return Err(ConfigError::InvalidUrl(format!(
            "unsupported database-url '{}': only SQLite destinations are available",
            storage.database_url
        )));
    }

    if storage.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }

    Ok(())
}
