//! Second-hand housing listings (rendered listing pages, no detail fetch)

use crate::fetch::FetchRequest;
use crate::record::Record;
use crate::sources::driver::{ListItem, ListingSource, Transport};
use crate::sources::html::{first_text, selector};
use crate::sources::ParseError;
use scraper::Html;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://bj.lianjia.com/ershoufang/";

pub struct HousingSource {
    base_url: String,
}

impl HousingSource {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Points the source at another listing root; it must end with `/`
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for HousingSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingSource for HousingSource {
    fn name(&self) -> &'static str {
        "housing"
    }

    fn destination(&self) -> &str {
        "housing_listings"
    }

    fn default_max_pages(&self) -> u32 {
        100
    }

    fn transport(&self) -> Transport {
        Transport::Rendered
    }

    fn page_request(&self, page: u32) -> Result<FetchRequest, ParseError> {
        let url = Url::parse(&self.base_url)?.join(&format!("pg{}/", page))?;
        Ok(FetchRequest::get(url))
    }

    fn parse_listing(
        &self,
        body: &str,
        _page_url: &Url,
    ) -> Result<Vec<Result<ListItem, ParseError>>, ParseError> {
        let document = Html::parse_document(body);
        let card = selector("li.clear")?;
        let position = selector(".positionInfo a")?;
        let total_price = selector(".totalPrice span")?;
        let unit_price = selector(".unitPrice span")?;
        let house_info = selector(".houseInfo")?;
        let deal_date = selector(".dealDate")?;

        let items = document
            .select(&card)
            .map(|card| {
                let link = card
                    .select(&position)
                    .next()
                    .ok_or(ParseError::MissingField("community"))?;
                let community = link.text().collect::<String>().trim().to_string();
                if community.is_empty() {
                    return Err(ParseError::MissingField("community"));
                }

                // "3室1厅 | 89.5平米 | 南 | 精装"
                let area = first_text(card, &house_info).and_then(|info| {
                    info.split('|')
                        .nth(1)
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                });

                let record = Record::new()
                    .with("community", community)
                    .with("address", link.value().attr("title"))
                    .with("price", first_text(card, &total_price))
                    .with("unit_price", first_text(card, &unit_price))
                    .with("area", area)
                    .with("deal_date", first_text(card, &deal_date));

                Ok(ListItem {
                    record,
                    detail_url: None,
                    date: None,
                })
            })
            .collect();

        Ok(items)
    }
}
