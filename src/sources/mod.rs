//! Crawl drivers for the supported data sources
//!
//! Every source is exposed through [`CrawlDriver`], an operation producing a
//! lazy, forward-only stream of records. Drivers are picked by
//! [`SourceKind`] through [`build_driver`] rather than by subclassing.
//!
//! Page and item failures are yielded as [`CrawlError`] values in the stream;
//! the crawl itself keeps going, and the caller decides what to do with them.

mod driver;
mod housing;
mod html;
mod legal;
mod news;
mod poi;
pub mod render;
pub mod text;

use crate::config::Config;
use crate::fetch::{FetchError, Fetcher};
use crate::record::Record;
use crate::storage::FileExporter;
use crate::HarvestError;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use driver::{ListItem, ListingSource, PagedDriver, Transport};
pub use housing::HousingSource;
pub use legal::LegalSource;
pub use news::NewsSource;
pub use poi::{bd09_to_wgs84, PoiSource};
pub use render::{ChromiumRenderer, PageRenderer, RenderError};

/// Lazy sequence of records produced by one crawl
pub type RecordStream<'a> = BoxStream<'a, Result<Record, CrawlError>>;

/// A source that can be crawled
pub trait CrawlDriver: Send + Sync {
    /// Short source name used in logs and on the command line
    fn name(&self) -> &'static str;

    /// Destination table records are written to
    fn destination(&self) -> &str;

    /// Whether records carry point coordinates worth exporting as GeoJSON
    fn exports_geometry(&self) -> bool {
        false
    }

    /// Starts a new crawl from the first page
    fn crawl<'a>(&'a self, request: &'a CrawlRequest) -> RecordStream<'a>;
}

/// Caller-supplied crawl parameters
#[derive(Debug, Clone, Default)]
pub struct CrawlRequest {
    /// Page limit; each source has its own default
    pub max_pages: Option<u32>,
    /// Inclusive publication date filter
    pub date_range: Option<DateRange>,
    /// Search rectangle for spatial sources
    pub bounds: Option<Bounds>,
    /// Search keyword for spatial sources
    pub category: Option<String>,
}

/// Inclusive date interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Builds a range from optional ends; a missing end is unbounded
    ///
    /// Returns `None` when both ends are missing.
    pub fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<Self> {
        if start.is_none() && end.is_none() {
            return None;
        }
        Some(Self {
            start: start.unwrap_or(NaiveDate::MIN),
            end: end.unwrap_or(NaiveDate::MAX),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Rectangle given by its south-west and north-east corners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west_lat: f64,
    pub south_west_lng: f64,
    pub north_east_lat: f64,
    pub north_east_lng: f64,
}

impl Bounds {
    /// Formats the rectangle as `sw_lat,sw_lng,ne_lat,ne_lng`
    pub fn to_query(&self) -> String {
        format!(
            "{},{},{},{}",
            self.south_west_lat, self.south_west_lng, self.north_east_lat, self.north_east_lng
        )
    }
}

impl FromStr for Bounds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid bounds '{}': {}", s, e))?;

        let &[sw_lat, sw_lng, ne_lat, ne_lng] = &parts[..] else {
            return Err(format!(
                "bounds must be SW_LAT,SW_LNG,NE_LAT,NE_LNG, got '{}'",
                s
            ));
        };
        if sw_lat > ne_lat || sw_lng > ne_lng {
            return Err(format!("south-west corner must not lie north-east of '{}'", s));
        }

        Ok(Self {
            south_west_lat: sw_lat,
            south_west_lng: sw_lng,
            north_east_lat: ne_lat,
            north_east_lng: ne_lng,
        })
    }
}

/// Registered sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Housing,
    Legal,
    News,
    Poi,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [Self::Housing, Self::Legal, Self::News, Self::Poi];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Housing => "housing",
            Self::Legal => "legal",
            Self::News => "news",
            Self::Poi => "poi",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                format!("unknown source '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Malformed page or payload
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid selector '{0}'")]
    Selector(String),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    #[error("Unexpected payload: {0}")]
    Unexpected(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A page- or item-scoped failure during a crawl
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Page {page} ({url}) could not be fetched: {source}")]
    PageFetch {
        page: u32,
        url: String,
        source: FetchError,
    },

    #[error("Page {page} ({url}) could not be rendered: {source}")]
    PageRender {
        page: u32,
        url: String,
        source: RenderError,
    },

    #[error("Page {page} ({url}) could not be parsed: {source}")]
    PageParse {
        page: u32,
        url: String,
        source: ParseError,
    },

    #[error("Malformed item on page {page}: {source}")]
    Item { page: u32, source: ParseError },

    #[error("Detail page {url} could not be fetched: {source}")]
    DetailFetch { url: String, source: FetchError },

    #[error("Detail page {url} could not be parsed: {source}")]
    DetailParse { url: String, source: ParseError },
}

impl CrawlError {
    /// Whether a whole listing page was lost rather than a single item
    pub fn is_page_level(&self) -> bool {
        matches!(
            self,
            Self::PageFetch { .. } | Self::PageRender { .. } | Self::PageParse { .. }
        )
    }
}

/// Shared services handed to every driver
#[derive(Clone)]
pub struct SourceContext {
    pub fetcher: Arc<Fetcher>,
    pub renderer: Option<Arc<dyn PageRenderer>>,
    pub render_wait: Duration,
    pub archive: Option<Arc<FileExporter>>,
    pub baidu_key: Option<String>,
}

impl SourceContext {
    /// Creates a context with only a fetcher; rendering and archiving off
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            renderer: None,
            render_wait: Duration::ZERO,
            archive: None,
            baidu_key: None,
        }
    }

    /// Creates a context from the loaded configuration
    pub fn from_config(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        let exporter = FileExporter::from_config(&config.storage);
        let archive = exporter.snapshots_enabled().then(|| Arc::new(exporter));
        let renderer: Arc<dyn PageRenderer> =
            Arc::new(ChromiumRenderer::new(config.renderer.binary.clone()));

        Self {
            fetcher,
            renderer: Some(renderer),
            render_wait: Duration::try_from_secs_f64(config.renderer.wait_seconds)
                .unwrap_or(Duration::ZERO),
            archive,
            baidu_key: config.api_keys.baidu_map.clone(),
        }
    }
}

/// Builds the driver for a source
///
/// # Errors
///
/// `HarvestError::MissingInput` when the points-of-interest source is asked
/// for without bounds, a category or an API key.
pub fn build_driver(
    kind: SourceKind,
    context: &SourceContext,
    request: &CrawlRequest,
) -> Result<Box<dyn CrawlDriver>, HarvestError> {
    let driver: Box<dyn CrawlDriver> = match kind {
        SourceKind::Housing => Box::new(paged(HousingSource::new(), context)),
        SourceKind::Legal => Box::new(paged(LegalSource::new(), context)),
        SourceKind::News => Box::new(paged(NewsSource::new(), context)),
        SourceKind::Poi => {
            let missing = |what| HarvestError::MissingInput {
                source_name: "poi",
                what,
            };
            let bounds = request.bounds.ok_or_else(|| missing("--bounds"))?;
            let category = request
                .category
                .clone()
                .ok_or_else(|| missing("--category"))?;
            let key = context
                .baidu_key
                .clone()
                .ok_or_else(|| missing("an api-keys.baidu-map key (or BAIDU_LBS_AK)"))?;
            Box::new(paged(PoiSource::new(bounds, category, key), context))
        }
    };
    Ok(driver)
}

/// Builds one driver per distinct source, in order of first mention
///
/// A source listed twice is crawled once; its destination counters would
/// otherwise be reported for both runs.
pub fn build_drivers(
    kinds: &[SourceKind],
    context: &SourceContext,
    request: &CrawlRequest,
) -> Result<Vec<Box<dyn CrawlDriver>>, HarvestError> {
    let mut distinct: Vec<SourceKind> = Vec::with_capacity(kinds.len());
    for kind in kinds {
        if distinct.contains(kind) {
            tracing::warn!("Source {} listed more than once, crawling it once", kind);
        } else {
            distinct.push(*kind);
        }
    }

    distinct
        .into_iter()
        .map(|kind| build_driver(kind, context, request))
        .collect()
}

fn paged<S: ListingSource>(source: S, context: &SourceContext) -> PagedDriver<S> {
    let mut driver = PagedDriver::new(source, Arc::clone(&context.fetcher));
    if let Some(renderer) = &context.renderer {
        driver = driver.with_renderer(Arc::clone(renderer), context.render_wait);
    }
    if let Some(archive) = &context.archive {
        driver = driver.with_archive(Arc::clone(archive));
    }
    driver
}
