//! Page-by-page crawl driver shared by every source
//!
//! A crawl walks listing pages `1..=max_pages` in order. For each page:
//!
//! 1. Load it over HTTP, or through the page renderer for script-built pages
//! 2. Split it into list items with the source's parser
//! 3. Stop if the page had no items at all
//! 4. Drop items outside the requested date range
//! 5. Fetch and merge the detail page for items that link to one
//!
//! A page that cannot be loaded or parsed is yielded as an error and the
//! crawl moves on to the next page. A malformed item is yielded as an error
//! and the rest of the page continues.

use crate::fetch::{FetchRequest, Fetcher};
use crate::record::Record;
use crate::sources::render::{PageRenderer, RenderError};
use crate::sources::{CrawlDriver, CrawlError, CrawlRequest, ParseError, RecordStream};
use crate::storage::{snapshot_identifier, FileExporter};
use async_stream::stream;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// How listing pages are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Plain HTTP through the fetcher
    Http,
    /// Headless browser through the page renderer
    Rendered,
}

/// One entry of a listing page
#[derive(Debug, Clone, Default)]
pub struct ListItem {
    /// Fields read from the listing itself
    pub record: Record,
    /// Page holding the full content, if the source has one
    pub detail_url: Option<Url>,
    /// Publication date used for range filtering
    pub date: Option<NaiveDate>,
}

/// Site-specific half of a crawl: where pages live and how to read them
pub trait ListingSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn destination(&self) -> &str;

    /// Page limit when the caller does not give one
    fn default_max_pages(&self) -> u32;

    fn transport(&self) -> Transport {
        Transport::Http
    }

    fn exports_geometry(&self) -> bool {
        false
    }

    /// Request for listing page `page` (1-based)
    fn page_request(&self, page: u32) -> Result<FetchRequest, ParseError>;

    /// Splits a listing page into items
    ///
    /// The outer error means the page as a whole is unusable; inner errors
    /// are single malformed items.
    fn parse_listing(
        &self,
        body: &str,
        page_url: &Url,
    ) -> Result<Vec<Result<ListItem, ParseError>>, ParseError>;

    /// Reads the extra fields of a detail page
    fn parse_detail(&self, _body: &str) -> Result<Record, ParseError> {
        Ok(Record::new())
    }
}

/// [`CrawlDriver`] over a [`ListingSource`]
pub struct PagedDriver<S> {
    source: S,
    fetcher: Arc<Fetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
    render_wait: Duration,
    archive: Option<Arc<FileExporter>>,
}

/// A loaded listing page
struct Page {
    url: Url,
    body: String,
}

impl<S: ListingSource> PagedDriver<S> {
    pub fn new(source: S, fetcher: Arc<Fetcher>) -> Self {
        Self {
            source,
            fetcher,
            renderer: None,
            render_wait: Duration::ZERO,
            archive: None,
        }
    }

    /// Sets the renderer used by sources with [`Transport::Rendered`]
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>, wait: Duration) -> Self {
        self.renderer = Some(renderer);
        self.render_wait = wait;
        self
    }

    /// Saves every fetched detail page as a raw HTML snapshot
    pub fn with_archive(mut self, archive: Arc<FileExporter>) -> Self {
        self.archive = Some(archive);
        self
    }

    async fn load_page(&self, page: u32) -> Result<Page, CrawlError> {
        let request = self
            .source
            .page_request(page)
            .map_err(|source| CrawlError::PageParse {
                page,
                url: self.source.name().to_string(),
                source,
            })?;

        match self.source.transport() {
            Transport::Http => {
                let response =
                    self.fetcher
                        .fetch(&request)
                        .await
                        .map_err(|source| CrawlError::PageFetch {
                            page,
                            url: request.url.to_string(),
                            source,
                        })?;
                let url = Url::parse(&response.url).unwrap_or_else(|_| request.url.clone());
                Ok(Page {
                    url,
                    body: response.body,
                })
            }
            Transport::Rendered => {
                let body = self.render(&request.url).await.map_err(|source| {
                    CrawlError::PageRender {
                        page,
                        url: request.url.to_string(),
                        source,
                    }
                })?;
                Ok(Page {
                    url: request.url,
                    body,
                })
            }
        }
    }

    /// Renders a page off the async workers, holding a request slot and
    /// observing the politeness delay afterwards
    async fn render(&self, url: &Url) -> Result<String, RenderError> {
        let renderer = self.renderer.clone().ok_or(RenderError::NotConfigured)?;
        let target = url.to_string();
        let wait = self.render_wait;

        let html = {
            let _slot = self
                .fetcher
                .acquire()
                .await
                .map_err(|e| RenderError::Join(e.to_string()))?;
            tokio::task::spawn_blocking(move || renderer.render_page(&target, wait))
                .await
                .map_err(|e| RenderError::Join(e.to_string()))??
        };

        tokio::time::sleep(self.fetcher.policy().politeness_delay()).await;
        Ok(html)
    }

    /// Fetches an item's detail page and merges its fields into the record
    async fn enrich(&self, mut record: Record, detail_url: Url) -> Result<Record, CrawlError> {
        let body = self
            .fetcher
            .fetch_text(detail_url.clone())
            .await
            .map_err(|source| CrawlError::DetailFetch {
                url: detail_url.to_string(),
                source,
            })?;

        self.snapshot(&detail_url, &body).await;

        let detail = self
            .source
            .parse_detail(&body)
            .map_err(|source| CrawlError::DetailParse {
                url: detail_url.to_string(),
                source,
            })?;
        record.merge(detail);
        Ok(record)
    }

    async fn snapshot(&self, url: &Url, body: &str) {
        let Some(archive) = self.archive.clone() else {
            return;
        };
        let identifier = snapshot_identifier(url.as_str());
        let html = body.to_string();

        let saved = tokio::task::spawn_blocking(move || archive.save_html(&identifier, &html)).await;
        match saved {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("Failed to save snapshot of {}: {}", url, e),
            Err(e) => tracing::warn!("Snapshot task for {} failed: {}", url, e),
        }
    }

    fn in_range(&self, request: &CrawlRequest, item: &ListItem) -> bool {
        match (&request.date_range, item.date) {
            (Some(range), Some(date)) => range.contains(date),
            _ => true,
        }
    }
}

impl<S: ListingSource> CrawlDriver for PagedDriver<S> {
    fn name(&self) -> &'static str {
        self.source.name()
    }

    fn destination(&self) -> &str {
        self.source.destination()
    }

    fn exports_geometry(&self) -> bool {
        self.source.exports_geometry()
    }

    fn crawl<'a>(&'a self, request: &'a CrawlRequest) -> RecordStream<'a> {
        Box::pin(stream! {
            let max_pages = request
                .max_pages
                .unwrap_or_else(|| self.source.default_max_pages());

            for page_number in 1..=max_pages {
                let page = match self.load_page(page_number).await {
                    Ok(page) => page,
                    Err(error) => {
                        yield Err(error);
                        continue;
                    }
                };

                let items = match self.source.parse_listing(&page.body, &page.url) {
                    Ok(items) => items,
                    Err(source) => {
                        yield Err(CrawlError::PageParse {
                            page: page_number,
                            url: page.url.to_string(),
                            source,
                        });
                        continue;
                    }
                };

                if items.is_empty() {
                    tracing::info!(
                        "{}: page {} has no items, stopping",
                        self.source.name(),
                        page_number
                    );
                    break;
                }
                tracing::debug!(
                    "{}: page {} lists {} items",
                    self.source.name(),
                    page_number,
                    items.len()
                );

                for item in items {
                    let item = match item {
                        Ok(item) => item,
                        Err(source) => {
                            yield Err(CrawlError::Item { page: page_number, source });
                            continue;
                        }
                    };

                    if !self.in_range(request, &item) {
                        tracing::debug!(
                            "{}: skipping item dated {:?}, outside requested range",
                            self.source.name(),
                            item.date
                        );
                        continue;
                    }

                    match item.detail_url {
                        Some(detail_url) => yield self.enrich(item.record, detail_url).await,
                        None => yield Ok(item.record),
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestPolicyConfig;
    use crate::fetch::{RequestPolicy, UserAgentRotator};
    use futures::StreamExt;
    use std::sync::Mutex;

    /// Source whose pages are canned strings, read through a renderer
    struct CannedSource;

    impl ListingSource for CannedSource {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn destination(&self) -> &str {
            "canned_items"
        }

        fn default_max_pages(&self) -> u32 {
            10
        }

        fn transport(&self) -> Transport {
            Transport::Rendered
        }

        fn page_request(&self, page: u32) -> Result<FetchRequest, ParseError> {
            Ok(FetchRequest::get(Url::parse(&format!(
                "http://canned.test/{}",
                page
            ))?))
        }

        fn parse_listing(
            &self,
            body: &str,
            _page_url: &Url,
        ) -> Result<Vec<Result<ListItem, ParseError>>, ParseError> {
            if body == "garbage" {
                return Err(ParseError::Unexpected("garbage".to_string()));
            }
            Ok(body
                .split(',')
                .filter(|entry| !entry.is_empty())
                .map(|entry| {
                    if entry == "bad" {
                        return Err(ParseError::MissingField("title"));
                    }
                    Ok(ListItem {
                        record: Record::new().with("title", entry),
                        detail_url: None,
                        date: None,
                    })
                })
                .collect())
        }
    }

    /// Renders `http://canned.test/<n>` as the n-th canned page
    struct CannedRenderer {
        pages: Vec<&'static str>,
        rendered: Mutex<Vec<String>>,
    }

    impl PageRenderer for CannedRenderer {
        fn render_page(&self, url: &str, _wait: Duration) -> Result<String, RenderError> {
            self.rendered.lock().unwrap().push(url.to_string());
            let index: usize = url.rsplit('/').next().unwrap().parse().unwrap();
            Ok(self.pages.get(index - 1).copied().unwrap_or("").to_string())
        }
    }

    fn fetcher() -> Arc<Fetcher> {
        let policy = RequestPolicy::from_config(&RequestPolicyConfig {
            min_delay: 0.0,
            max_delay: 0.0,
            timeout: 1.0,
            max_retries: 0,
            backoff_multiplier: 1.0,
            max_concurrent_requests: 2,
            proxy_cooldown: 300,
        });
        Arc::new(Fetcher::new(policy, UserAgentRotator::new(vec![]), None).unwrap())
    }

    fn driver(pages: Vec<&'static str>) -> (Arc<CannedRenderer>, PagedDriver<CannedSource>) {
        let renderer = Arc::new(CannedRenderer {
            pages,
            rendered: Mutex::new(Vec::new()),
        });
        let driver = PagedDriver::new(CannedSource, fetcher())
            .with_renderer(renderer.clone(), Duration::ZERO);
        (renderer, driver)
    }

    async fn collect(
        driver: &PagedDriver<CannedSource>,
        request: &CrawlRequest,
    ) -> Vec<Result<Record, CrawlError>> {
        driver.crawl(request).collect().await
    }

    fn pages(max_pages: u32) -> CrawlRequest {
        CrawlRequest {
            max_pages: Some(max_pages),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stops_at_empty_page() {
        let (renderer, driver) = driver(vec!["a,b", "c", ""]);
        let results = collect(&driver, &CrawlRequest::default()).await;

        let titles: Vec<String> = results
            .into_iter()
            .map(|r| r.unwrap().get_str("title").unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
        assert_eq!(renderer.rendered.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stops_at_page_limit() {
        let (renderer, driver) = driver(vec!["a", "b", "c"]);
        let results = collect(&driver, &pages(2)).await;

        assert_eq!(results.len(), 2);
        assert_eq!(
            *renderer.rendered.lock().unwrap(),
            vec!["http://canned.test/1", "http://canned.test/2"]
        );
    }

    #[tokio::test]
    async fn test_bad_item_and_bad_page_do_not_stop_crawl() {
        let (_renderer, driver) = driver(vec!["a,bad,b", "garbage", "c"]);
        let results = collect(&driver, &pages(3)).await;

        assert_eq!(results.len(), 5);
        assert!(matches!(results[1], Err(CrawlError::Item { page: 1, .. })));
        assert!(matches!(results[3], Err(CrawlError::PageParse { page: 2, .. })));
        assert_eq!(results[4].as_ref().unwrap().get_str("title"), Some("c"));
    }

    #[tokio::test]
    async fn test_all_malformed_page_is_not_empty() {
        let (_renderer, driver) = driver(vec!["bad,bad", "a"]);
        let results = collect(&driver, &pages(2)).await;

        assert_eq!(results.len(), 3);
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_rendered_source_without_renderer() {
        let driver = PagedDriver::new(CannedSource, fetcher());
        let results = collect(&driver, &pages(1)).await;

        assert!(matches!(
            results[0],
            Err(CrawlError::PageRender {
                source: RenderError::NotConfigured,
                ..
            })
        ));
    }
}
