//! Regional news items about disasters and accidents
//!
//! Listing items must carry a link and a publication date. The date is read
//! from the listing so out-of-range articles are dropped before their
//! detail page is requested.

use crate::fetch::FetchRequest;
use crate::record::Record;
use crate::sources::driver::{ListItem, ListingSource};
use crate::sources::html::{block_text, first_text, selector};
use crate::sources::text::{detect_disaster_type, extract_loss_info, guess_location, parse_date};
use crate::sources::ParseError;
use scraper::Html;
use serde_json::{json, Value};
use url::Url;

const DEFAULT_BASE_URL: &str = "http://www.north-news.cn/";

const LOCATION_MARKERS: &[&str] = &["市", "区", "县"];

pub struct NewsSource {
    base_url: String,
}

impl NewsSource {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for NewsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingSource for NewsSource {
    fn name(&self) -> &'static str {
        "news"
    }

    fn destination(&self) -> &str {
        "news_events"
    }

    fn default_max_pages(&self) -> u32 {
        20
    }

    fn page_request(&self, page: u32) -> Result<FetchRequest, ParseError> {
        let url = Url::parse(&self.base_url)?.join(&format!("news/node_{}.htm", page))?;
        Ok(FetchRequest::get(url))
    }

    fn parse_listing(
        &self,
        body: &str,
        page_url: &Url,
    ) -> Result<Vec<Result<ListItem, ParseError>>, ParseError> {
        let document = Html::parse_document(body);
        let row = selector(".list li")?;
        let link = selector("a")?;
        let date = selector("span")?;

        let items = document
            .select(&row)
            .map(|row| {
                let anchor = row.select(&link).next().ok_or(ParseError::MissingField("link"))?;
                let href = anchor.value().attr("href").ok_or(ParseError::MissingField("href"))?;
                let published = first_text(row, &date)
                    .as_deref()
                    .and_then(parse_date)
                    .ok_or(ParseError::MissingField("publish_date"))?;
                let url = page_url.join(href)?;

                let record = Record::new()
                    .with("title", anchor.text().collect::<String>().trim())
                    .with("url", url.as_str())
                    .with("publish_date", published.format("%Y-%m-%dT00:00:00").to_string());

                Ok(ListItem {
                    record,
                    detail_url: Some(url),
                    date: Some(published),
                })
            })
            .collect();

        Ok(items)
    }

    fn parse_detail(&self, body: &str) -> Result<Record, ParseError> {
        let document = Html::parse_document(body);
        let mut content = None;
        for css in [".article", "#article", "body"] {
            if let Some(element) = document.select(&selector(css)?).next() {
                content = Some(block_text(element));
                break;
            }
        }
        let content = content.unwrap_or_default();

        let loss = extract_loss_info(&content)
            .map(|loss| json!({ "amount": loss.amount, "unit": loss.unit }))
            .unwrap_or(Value::Null);

        Ok(Record::new()
            .with(
                "location",
                guess_location(&content, LOCATION_MARKERS, 20, Some(20)),
            )
            .with("disaster_type", detect_disaster_type(&content))
            .with("loss", loss)
            .with("content", content))
    }
}
