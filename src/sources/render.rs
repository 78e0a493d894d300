//! Headless browser rendering for script-built listing pages

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No page renderer configured")]
    NotConfigured,

    #[error("Invalid browser configuration: {0}")]
    Config(String),

    #[error("Failed to start render runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Browser error: {0}")]
    Browser(#[from] CdpError),

    #[error("Render task failed: {0}")]
    Join(String),
}

/// Produces the final DOM of a page after its scripts have run
///
/// Implementations block; callers run them on the blocking thread pool.
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, url: &str, wait: Duration) -> Result<String, RenderError>;
}

static PROFILE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Renders pages in a headless Chromium driven over the DevTools protocol
///
/// Every call launches its own browser with a throwaway profile, so
/// concurrent renders never share browser state.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    binary: String,
}

impl ChromiumRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn browser_config(&self, profile: &Path) -> Result<BrowserConfig, RenderError> {
        BrowserConfig::builder()
            .chrome_executable(&self.binary)
            .no_sandbox()
            .arg("--disable-gpu")
            .user_data_dir(profile)
            .build()
            .map_err(RenderError::Config)
    }

    async fn render(&self, url: &str, wait: Duration, profile: &Path) -> Result<String, RenderError> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config(profile)?).await?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let html = match browser.new_page("about:blank").await {
            Ok(page) => load(page, url, wait).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = browser.close().await {
            tracing::warn!("Failed to close browser after {}: {}", url, e);
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!("Browser process for {} did not exit cleanly: {}", url, e);
        }
        events.abort();

        html
    }
}

/// Navigates, gives scripts `wait` of wall-clock time, then reads the DOM
///
/// The page is closed whether or not loading succeeded.
async fn load(page: Page, url: &str, wait: Duration) -> Result<String, RenderError> {
    let html = async {
        page.goto(url).await?;
        tokio::time::sleep(wait).await;
        page.content().await
    }
    .await;

    if let Err(e) = page.close().await {
        tracing::debug!("Failed to close page for {}: {}", url, e);
    }
    Ok(html?)
}

fn profile_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "sumi-harvest-chromium-{}-{}",
        std::process::id(),
        PROFILE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ))
}

impl PageRenderer for ChromiumRenderer {
    fn render_page(&self, url: &str, wait: Duration) -> Result<String, RenderError> {
        tracing::debug!("Rendering {} with {}", url, self.binary);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(RenderError::Runtime)?;

        let profile = profile_dir();
        let html = runtime.block_on(self.render(url, wait, &profile));

        if let Err(e) = std::fs::remove_dir_all(&profile) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("Failed to remove browser profile {}: {}", profile.display(), e);
            }
        }
        html
    }
}
