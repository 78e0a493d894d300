//! Court judgment summaries with a detail page per case

use crate::fetch::FetchRequest;
use crate::record::Record;
use crate::sources::driver::{ListItem, ListingSource};
use crate::sources::html::{block_text, first_text, selector};
use crate::sources::text::{guess_location, parse_date};
use crate::sources::ParseError;
use scraper::Html;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.bjcourt.gov.cn/bjws/bsal/";

const LOCATION_MARKERS: &[&str] = &["北京市", "区", "县"];
const CHARGE_KEYWORDS: &[&str] = &["盗窃", "故意伤害", "诈骗", "抢劫"];

pub struct LegalSource {
    base_url: String,
}

impl LegalSource {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for LegalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingSource for LegalSource {
    fn name(&self) -> &'static str {
        "legal"
    }

    fn destination(&self) -> &str {
        "legal_cases"
    }

    fn default_max_pages(&self) -> u32 {
        5
    }

    fn page_request(&self, page: u32) -> Result<FetchRequest, ParseError> {
        Ok(FetchRequest::get(Url::parse(&self.base_url)?).with_param("page", page))
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
                let detail_url = page_url.join(href)?;

                let date_text = first_text(row, &date);
                let judgment_date = date_text.as_deref().and_then(parse_date);

                let record = Record::new()
                    .with("title", anchor.text().collect::<String>().trim())
                    .with("case_type", "刑事")
                    .with(
                        "judgment_date",
                        judgment_date.map(|d| d.to_string()).or(date_text),
                    )
                    .with("detail_url", detail_url.as_str());

                Ok(ListItem {
                    record,
                    detail_url: Some(detail_url),
                    date: judgment_date,
                })
            })
            .collect();

        Ok(items)
    }

    fn parse_detail(&self, body: &str) -> Result<Record, ParseError> {
        let document = Html::parse_document(body);
        let article = selector(".article")?;
        let text = document
            .select(&article)
            .next()
            .map(block_text)
            .unwrap_or_default();

        Ok(Record::new()
            .with("location", guess_location(&text, LOCATION_MARKERS, 12, None))
            .with("charges", extract_charges(&text))
            .with("statutes", extract_statutes(&text))
            .with("content", text))
    }
}

/// First known charge mentioned in the judgment
fn extract_charges(text: &str) -> Option<&'static str> {
    CHARGE_KEYWORDS
        .iter()
        .find(|keyword| text.contains(*keyword))
        .copied()
}

/// Cited statute, from the opening 《 up to the first 法 after it
fn extract_statutes(text: &str) -> Option<String> {
    let start = text.find('《')?;
    let end = start + text[start..].find('法')? + '法'.len_utf8();
    Some(text[start..end].to_string())
}
