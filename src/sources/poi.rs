//! Points of interest from the Baidu place search API
//!
//! Baidu returns BD-09 coordinates. They are converted to WGS-84 (through
//! GCJ-02) before being stored so they line up with other map layers.

use crate::fetch::FetchRequest;
use crate::record::Record;
use crate::sources::driver::{ListItem, ListingSource};
use crate::sources::{Bounds, ParseError};
use serde::Deserialize;
use serde_json::Value;
use std::f64::consts::PI;
use url::Url;

const DEFAULT_ENDPOINT: &str = "https://api.map.baidu.com/place/v2/search";
const PAGE_SIZE: u32 = 20;

const X_PI: f64 = PI * 3000.0 / 180.0;
/// Krasovsky 1940 semi-major axis and eccentricity squared
const KRASOVSKY_A: f64 = 6378245.0;
const KRASOVSKY_EE: f64 = 0.006_693_421_622_965_943;

#[derive(Debug, Deserialize)]
struct PlaceResponse {
    status: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: String,
    location: Location,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    uid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

pub struct PoiSource {
    endpoint: String,
    bounds: Bounds,
    category: String,
    api_key: String,
}

impl PoiSource {
    pub fn new(bounds: Bounds, category: String, api_key: String) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            bounds,
            category,
            api_key,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn to_item(&self, raw: Value) -> Result<ListItem, ParseError> {
        let place: Place = serde_json::from_value(raw)?;
        let (longitude, latitude) = bd09_to_wgs84(place.location.lng, place.location.lat);

        let record = Record::new()
            .with("name", place.name)
            .with("category", self.category.as_str())
            .with("longitude", longitude)
            .with("latitude", latitude)
            .with("address", place.address)
            .with("uid", place.uid);

        Ok(ListItem {
            record,
            detail_url: None,
            date: None,
        })
    }
}

impl ListingSource for PoiSource {
    fn name(&self) -> &'static str {
        "poi"
    }

    fn destination(&self) -> &str {
        "poi_records"
    }

    fn default_max_pages(&self) -> u32 {
        5
    }

    fn exports_geometry(&self) -> bool {
        true
    }

    fn page_request(&self, page: u32) -> Result<FetchRequest, ParseError> {
        Ok(FetchRequest::get(Url::parse(&self.endpoint)?)
            .with_param("query", &self.category)
            .with_param("bounds", self.bounds.to_query())
            .with_param("output", "json")
            .with_param("ak", &self.api_key)
            .with_param("page_size", PAGE_SIZE)
            .with_param("page_num", page.saturating_sub(1)))
    }

    fn parse_listing(
        &self,
        body: &str,
        _page_url: &Url,
    ) -> Result<Vec<Result<ListItem, ParseError>>, ParseError> {
        let response: PlaceResponse = serde_json::from_str(body)?;
        if response.status != 0 {
            return Err(ParseError::Unexpected(format!(
                "place search returned status {}: {}",
                response.status,
                response.message.unwrap_or_default()
            )));
        }

        Ok(response
            .results
            .into_iter()
            .map(|raw| self.to_item(raw))
            .collect())
    }
}

/// Converts BD-09 coordinates to WGS-84, returning `(lng, lat)`
pub fn bd09_to_wgs84(lng: f64, lat: f64) -> (f64, f64) {
    let (gcj_lng, gcj_lat) = bd09_to_gcj02(lng, lat);
    gcj02_to_wgs84(gcj_lng, gcj_lat)
}

fn bd09_to_gcj02(lng: f64, lat: f64) -> (f64, f64) {
    let x = lng - 0.0065;
    let y = lat - 0.006;
    let z = (x * x + y * y).sqrt() - 0.00002 * (y * X_PI).sin();
    let theta = y.atan2(x) - 0.000003 * (x * X_PI).cos();
    (z * theta.cos(), z * theta.sin())
}

fn gcj02_to_wgs84(lng: f64, lat: f64) -> (f64, f64) {
    if outside_china(lng, lat) {
        return (lng, lat);
    }

    let mut d_lat = transform_lat(lng - 105.0, lat - 35.0);
    let mut d_lng = transform_lng(lng - 105.0, lat - 35.0);
    let rad_lat = lat / 180.0 * PI;
    let magic = 1.0 - KRASOVSKY_EE * rad_lat.sin() * rad_lat.sin();
    let sqrt_magic = magic.sqrt();
    d_lat = (d_lat * 180.0) / ((KRASOVSKY_A * (1.0 - KRASOVSKY_EE)) / (magic * sqrt_magic) * PI);
    d_lng = (d_lng * 180.0) / (KRASOVSKY_A / sqrt_magic * rad_lat.cos() * PI);

    (lng - d_lng, lat - d_lat)
}

fn outside_china(lng: f64, lat: f64) -> bool {
    !(72.004..=137.8347).contains(&lng) || !(0.8293..=55.8271).contains(&lat)
}

fn transform_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn transform_lng(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}
