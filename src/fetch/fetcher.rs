//! HTTP fetcher implementation
//!
//! This module handles every outbound request made by the sources:
//! - Building HTTP clients (one direct, one per proxy in use)
//! - User agent rotation and proxy selection per request
//! - Retry with exponential backoff for transient failures
//! - A post-success politeness delay
//! - A global cap on requests in flight
//! - Error classification

use crate::config::Config;
use crate::fetch::identity::UserAgentRotator;
use crate::fetch::policy::RequestPolicy;
use crate::fetch::proxy::ProxyPool;
use crate::HarvestError;
use reqwest::header::USER_AGENT;
use reqwest::{Client, Method, Proxy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};
use url::Url;

/// Classified fetch failure
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Gave up after {attempts} attempts: {cause}")]
    ExhaustedRetries { attempts: u32, cause: Box<FetchError> },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether the failure is transient (timeouts, connection errors, 5xx)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::HttpStatus(code) => (500..600).contains(code),
            Self::ExhaustedRetries { .. } | Self::Client(_) => false,
        }
    }

    /// Whether the failure can be blamed on the proxy carrying the request
    fn implicates_proxy(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection(_))
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if let Some(status) = error.status() {
            Self::HttpStatus(status.as_u16())
        } else {
            Self::Connection(error.to_string())
        }
    }
}

/// Outcome of a single fetch call
pub type FetchResult = Result<FetchResponse, FetchError>;

/// A single outbound request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
}

impl FetchRequest {
    /// Creates a GET request without query parameters
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            query: Vec::new(),
        }
    }

    /// Appends a query parameter
    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// Successful response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response body decoded as text
    pub body: String,
}

/// Shared, reentrant HTTP fetcher
///
/// The fetcher owns the underlying connection pools; dropping it releases
/// them. Each request attempt holds a permit from the global limiter for its
/// whole duration, and the permit is returned on every exit path, including
/// when the calling task is cancelled.
pub struct Fetcher {
    policy: RequestPolicy,
    agents: UserAgentRotator,
    proxies: Option<Arc<ProxyPool>>,
    limiter: Semaphore,
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
}

/// A held slot in the global request limiter
pub struct ConnectionSlot<'a> {
    _permit: SemaphorePermit<'a>,
}

impl Fetcher {
    /// Creates a fetcher
    ///
    /// # Arguments
    ///
    /// * `policy` - The request policy shared by every call
    /// * `agents` - User agents to rotate through
    /// * `proxies` - Proxy pool, or `None` to always connect directly
    ///
    /// # Returns
    ///
    /// * `Ok(Fetcher)` - Ready to issue requests
    /// * `Err(FetchError::Client)` - The HTTP client could not be built
    pub fn new(
        policy: RequestPolicy,
        agents: UserAgentRotator,
        proxies: Option<Arc<ProxyPool>>,
    ) -> Result<Self, FetchError> {
        let direct = build_http_client(&policy, None)?;
        let limiter = Semaphore::new(policy.max_concurrent_requests());

        Ok(Self {
            policy,
            agents,
            proxies,
            limiter,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a fetcher from the loaded configuration
    ///
    /// Loads the proxy pool file when proxies are enabled.
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let policy = RequestPolicy::from_config(&config.request_policy);
        let agents = UserAgentRotator::new(config.user_agents.pool.clone());

        let proxies = match (&config.proxy.pool_file, config.proxy.enabled) {
            (Some(path), true) => Some(Arc::new(ProxyPool::from_file(path)?)),
            _ => None,
        };

        Ok(Self::new(policy, agents, proxies)?)
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    pub fn proxies(&self) -> Option<&Arc<ProxyPool>> {
        self.proxies.as_ref()
    }

    /// Waits for a free slot in the global request limiter
    pub async fn acquire(&self) -> Result<ConnectionSlot<'_>, FetchError> {
        let permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| FetchError::Connection("request limiter closed".to_string()))?;
        Ok(ConnectionSlot { _permit: permit })
    }

    /// Fetches a URL with GET and returns the body on success
    pub async fn fetch_text(&self, url: Url) -> Result<String, FetchError> {
        self.fetch(&FetchRequest::get(url)).await.map(|r| r.body)
    }

    /// Fetches a request with retry, backoff and politeness
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Politeness delay, then return the body |
    /// | 4xx | Immediate → `HttpStatus(code)` |
    /// | 5xx | Retry with backoff |
    /// | Timeout | Retry with backoff |
    /// | Connection error | Retry with backoff |
    /// | Retries used up | `ExhaustedRetries` carrying the last error |
    ///
    /// Timeouts and connection errors while a proxy was in use put that proxy
    /// on cooldown before the next attempt.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResult {
        let retry = self.policy.retry();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.attempt(request).await {
                Ok(response) => {
                    let delay = self.policy.politeness_delay();
                    tracing::debug!(
                        "Fetched {} ({}), sleeping {:?}",
                        response.url,
                        response.status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    return Ok(response);
                }
                Err(error) if !error.is_retryable() => {
                    tracing::debug!("{} {} failed: {}", request.method, request.url, error);
                    return Err(error);
                }
                Err(error) if !retry.should_retry(&error, attempt) => {
                    tracing::warn!(
                        "{} {} exhausted {} attempts: {}",
                        request.method,
                        request.url,
                        attempt,
                        error
                    );
                    return Err(FetchError::ExhaustedRetries {
                        attempts: attempt,
                        cause: Box::new(error),
                    });
                }
                Err(error) => {
                    let backoff = retry.backoff(attempt);
                    tracing::warn!(
                        "{} {} attempt {}/{} failed: {}; retrying in {:?}",
                        request.method,
                        request.url,
                        attempt,
                        retry.max_attempts(),
                        error,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Performs exactly one request attempt
    async fn attempt(&self, request: &FetchRequest) -> FetchResult {
        let proxy = self.proxies.as_ref().and_then(|pool| pool.next_proxy());
        let client = match &proxy {
            Some(address) => match self.client_for_proxy(address) {
                Ok(client) => client,
                Err(error) => {
                    self.report_proxy_failure(address, &error);
                    return Err(error);
                }
            },
            None => self.direct.clone(),
        };

        let result = {
            let _slot = self.acquire().await?;
            send(&client, request, self.agents.next_agent()).await
        };

        if let (Err(error), Some(address)) = (&result, &proxy) {
            self.report_proxy_failure(address, error);
        }

        result
    }

    fn report_proxy_failure(&self, address: &str, error: &FetchError) {
        if !error.implicates_proxy() {
            return;
        }
        if let Some(pool) = &self.proxies {
            pool.mark_failure(address, self.policy.proxy_cooldown());
        }
    }

    /// Returns the cached client for a proxy, building it on first use
    fn client_for_proxy(&self, address: &str) -> Result<Client, FetchError> {
        let mut clients = self
            .proxied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(client) = clients.get(address) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.policy, Some(address))?;
        clients.insert(address.to_string(), client.clone());
        Ok(client)
    }
}

/// Builds an HTTP client honoring the policy timeout
///
/// Environment proxy variables are ignored; egress goes through the proxy
/// pool or directly.
fn build_http_client(policy: &RequestPolicy, proxy: Option<&str>) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .timeout(policy.timeout())
        .connect_timeout(policy.timeout())
        .gzip(true)
        .brotli(true);

    builder = match proxy {
        Some(address) => {
            let proxy = Proxy::all(address)
                .map_err(|e| FetchError::Connection(format!("invalid proxy {}: {}", address, e)))?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder.build().map_err(|e| FetchError::Client(e.to_string()))
}

/// Sends one request and classifies the response
async fn send(client: &Client, request: &FetchRequest, user_agent: &str) -> FetchResult {
    let mut builder = client
        .request(request.method.clone(), request.url.clone())
        .header(USER_AGENT, user_agent);
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }

    let response = builder.send().await.map_err(FetchError::from_reqwest)?;
    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let body = response.text().await.map_err(FetchError::from_reqwest)?;

    Ok(FetchResponse {
        url: final_url,
        status: status.as_u16(),
        body,
    })
}
