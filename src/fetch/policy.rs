//! Request policy enforcement
//!
//! Turns the `[request-policy]` section into the values the fetcher needs:
//! timeout, politeness delay sampling, and the retry schedule.

use crate::config::RequestPolicyConfig;
use crate::fetch::FetchError;
use rand::Rng;
use std::time::Duration;

/// Immutable request policy shared by every fetch
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    min_delay: Duration,
    max_delay: Duration,
    timeout: Duration,
    max_concurrent_requests: usize,
    proxy_cooldown: Duration,
    retry: RetryPolicy,
}

/// Retry schedule for transient failures
///
/// The first attempt is not a retry; a policy with `max_retries = 2` makes
/// at most three attempts. The wait before retry `n` (1-based) is
/// `backoff_multiplier ^ n` seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_multiplier: f64,
}

impl RequestPolicy {
    /// Builds a policy from validated configuration
    pub fn from_config(config: &RequestPolicyConfig) -> Self {
        Self {
            min_delay: seconds(config.min_delay),
            max_delay: seconds(config.max_delay),
            timeout: seconds(config.timeout),
            max_concurrent_requests: config.max_concurrent_requests.max(1) as usize,
            proxy_cooldown: Duration::from_secs(config.proxy_cooldown),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_multiplier: config.backoff_multiplier,
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    pub fn proxy_cooldown(&self) -> Duration {
        self.proxy_cooldown
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Bounds of the politeness delay as `(min, max)`
    pub fn delay_bounds(&self) -> (Duration, Duration) {
        (self.min_delay, self.max_delay)
    }

    /// Samples a politeness delay uniformly from `[min_delay, max_delay]`
    pub fn politeness_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }

        let low = self.min_delay.as_secs_f64();
        let high = self.max_delay.as_secs_f64();
        let sampled = rand::rng().random_range(low..=high);

        // f64 round-tripping can land a nanosecond outside the bounds
        seconds(sampled).clamp(self.min_delay, self.max_delay)
    }
}

impl RetryPolicy {
    /// Total number of attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before the given retry (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        seconds(self.backoff_multiplier.powi(exponent))
    }

    /// Whether another attempt should follow a failure on attempt `attempt`
    /// (1-based)
    pub fn should_retry(&self, error: &FetchError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_attempts()
    }
}

/// Converts fractional seconds to a duration, saturating on overflow
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}
