use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "request-policy")]
    pub request_policy: RequestPolicyConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(rename = "user-agents")]
    pub user_agents: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(rename = "api-keys", default)]
    pub api_keys: ApiKeysConfig,
}

/// Outbound request policy
#[derive(Debug, Clone, Deserialize)]
pub struct RequestPolicyConfig {
    /// Lower bound of the post-success politeness delay (seconds)
    #[serde(rename = "min-delay")]
    pub min_delay: f64,

    /// Upper bound of the post-success politeness delay (seconds)
    #[serde(rename = "max-delay")]
    pub max_delay: f64,

    /// Per-request timeout (seconds)
    pub timeout: f64,

    /// Number of retries after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff between retries
    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: f64,

    /// Maximum number of requests in flight across all sources
    #[serde(rename = "max-concurrent-requests", default = "default_max_concurrent")]
    pub max_concurrent_requests: u32,

    /// How long a failing proxy is excluded from selection (seconds)
    #[serde(rename = "proxy-cooldown", default = "default_proxy_cooldown")]
    pub proxy_cooldown: u64,
}

/// Proxy pool configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Plain-text file with one proxy URI per line
    #[serde(rename = "pool-file")]
    pub pool_file: Option<PathBuf>,
}

/// User agent rotation pool
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    pub pool: Vec<String>,
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `sqlite://path`, `sqlite::memory:` or a bare file path
    #[serde(rename = "database-url")]
    pub database_url: String,

    /// Number of buffered records per destination that triggers a flush
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Directory for raw HTML snapshots of detail pages
    #[serde(rename = "raw-html-dir")]
    pub raw_html_dir: Option<PathBuf>,

    /// Directory for GeoJSON exports of point records
    #[serde(rename = "geojson-dir")]
    pub geojson_dir: Option<PathBuf>,
}

/// Headless browser used by sources that need rendered pages
#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    #[serde(default = "default_renderer_binary")]
    pub binary: String,

    /// Time given to the page to settle before the DOM is dumped (seconds)
    #[serde(rename = "wait-seconds", default = "default_render_wait")]
    pub wait_seconds: f64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            binary: default_renderer_binary(),
            wait_seconds: default_render_wait(),
        }
    }
}

/// Credentials for keyed APIs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeysConfig {
    #[serde(rename = "baidu-map")]
    pub baidu_map: Option<String>,
}

fn default_max_concurrent() -> u32 {
    8
}

fn default_proxy_cooldown() -> u64 {
    300
}

fn default_batch_size() -> usize {
    200
}

fn default_renderer_binary() -> String {
    "chromium".to_string()
}

fn default_render_wait() -> f64 {
    2.0
}
