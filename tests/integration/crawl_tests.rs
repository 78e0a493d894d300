//! Crawl drivers against mock sites
//!
//! Each test mounts listing and detail pages on a mock server, points a
//! source at it, and checks the records and errors the crawl yields.

use crate::common::{article, fetcher, listing};
use chrono::NaiveDate;
use futures::StreamExt;
use std::sync::Arc;
use sumi_harvest::sources::{
    CrawlDriver, CrawlError, CrawlRequest, DateRange, LegalSource, NewsSource, PagedDriver,
    PoiSource,
};
use sumi_harvest::storage::{snapshot_identifier, FileExporter};
use sumi_harvest::{FetchError, Record};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_html(server: &MockServer, route: &str, body: String, calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(calls)
        .mount(server)
        .await;
}

async fn run(driver: &dyn CrawlDriver, request: &CrawlRequest) -> Vec<Result<Record, CrawlError>> {
    driver.crawl(request).collect().await
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_news_date_filter_skips_detail_fetch() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/news/node_1.htm",
        listing(&[
            ("/news/content/in.htm", "包头市仓库火灾", Some("2019-06-01")),
            ("/news/content/out.htm", "旧闻", Some("2018-12-31")),
        ]),
        1,
    )
    .await;
    mount_html(&server, "/news/node_2.htm", listing(&[]), 1).await;
    mount_html(
        &server,
        "/news/content/in.htm",
        article("昨日包头市一仓库起火，造成3人受伤"),
        1,
    )
    .await;
    // The out-of-range item must never be requested
    mount_html(&server, "/news/content/out.htm", article("旧闻"), 0).await;

    let source = NewsSource::with_base_url(format!("{}/", server.uri()));
    let driver = PagedDriver::new(source, fetcher(0));
    let request = CrawlRequest {
        date_range: DateRange::from_bounds(Some(date(2019, 1, 1)), Some(date(2019, 12, 31))),
        ..Default::default()
    };

    let results = run(&driver, &request).await;

    assert_eq!(results.len(), 1);
    let record = results[0].as_ref().unwrap();
    assert_eq!(record.get_str("title"), Some("包头市仓库火灾"));
    assert_eq!(record.get_str("publish_date"), Some("2019-06-01T00:00:00"));
    assert_eq!(record.get_str("disaster_type"), Some("火灾"));
    assert_eq!(record.get_str("location"), Some("昨日包头市"));
    assert_eq!(record.get("loss").unwrap()["unit"], "人");
}

#[tokio::test]
async fn test_legal_failed_page_does_not_stop_crawl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bjws/bsal/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[(
            "detail/1.html",
            "张某盗窃案",
            Some("2019-06-18"),
        )])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bjws/bsal/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bjws/bsal/"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[])))
        .expect(1)
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/bjws/bsal/detail/1.html",
        article("北京市海淀区人民法院认定被告人犯盗窃罪，依照《中华人民共和国刑法》判决"),
        1,
    )
    .await;

    let source = LegalSource::with_base_url(format!("{}/bjws/bsal/", server.uri()));
    let driver = PagedDriver::new(source, fetcher(0));

    let results = run(&driver, &CrawlRequest::default()).await;

    assert_eq!(results.len(), 2);
    let record = results[0].as_ref().unwrap();
    assert_eq!(record.get_str("title"), Some("张某盗窃案"));
    assert_eq!(record.get_str("charges"), Some("盗窃"));
    assert_eq!(record.get_str("judgment_date"), Some("2019-06-18"));
    assert!(matches!(
        &results[1],
        Err(CrawlError::PageFetch {
            page: 2,
            source: FetchError::ExhaustedRetries { .. },
            ..
        })
    ));
}

#[tokio::test]
async fn test_missing_detail_skips_only_that_item() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/news/node_1.htm",
        listing(&[
            ("/news/content/gone.htm", "已删除", Some("2020-01-02")),
            ("/news/content/ok.htm", "暴雨积水", Some("2020-01-03")),
        ]),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/news/content/gone.htm"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_html(&server, "/news/content/ok.htm", article("暴雨导致道路积水"), 1).await;

    let source = NewsSource::with_base_url(format!("{}/", server.uri()));
    let driver = PagedDriver::new(source, fetcher(2));
    let request = CrawlRequest {
        max_pages: Some(1),
        ..Default::default()
    };

    let results = run(&driver, &request).await;

    assert_eq!(results.len(), 2);
    assert!(matches!(
        &results[0],
        Err(CrawlError::DetailFetch {
            source: FetchError::HttpStatus(404),
            ..
        })
    ));
    assert_eq!(results[1].as_ref().unwrap().get_str("disaster_type"), Some("洪涝"));
}

#[tokio::test]
async fn test_detail_snapshots_are_archived() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/bjws/bsal/",
        listing(&[("detail/7.html", "王某诈骗案", None)]),
        1,
    )
    .await;
    let detail = article("被告人王某犯诈骗罪");
    mount_html(&server, "/bjws/bsal/detail/7.html", detail.clone(), 1).await;

    let source = LegalSource::with_base_url(format!("{}/bjws/bsal/", server.uri()));
    let exporter = Arc::new(FileExporter::new(Some(dir.path().to_path_buf()), None));
    let driver = PagedDriver::new(source, fetcher(0)).with_archive(exporter);
    let request = CrawlRequest {
        max_pages: Some(1),
        ..Default::default()
    };

    let results = run(&driver, &request).await;
    assert_eq!(results.len(), 1);

    let detail_url = format!("{}/bjws/bsal/detail/7.html", server.uri());
    let snapshot = dir
        .path()
        .join(format!("{}.html", snapshot_identifier(&detail_url)));
    assert_eq!(std::fs::read_to_string(snapshot).unwrap(), detail);
}

#[tokio::test]
async fn test_poi_pages_through_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/place/v2/search"))
        .and(query_param("page_num", "0"))
        .and(query_param("query", "学校"))
        .and(query_param("ak", "test-ak"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 0,
            "results": [
                {"name": "北京四中", "location": {"lat": 39.94, "lng": 116.38}, "address": "西城区"},
                {"name": "北京八中", "location": {"lat": 39.91, "lng": 116.36}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/place/v2/search"))
        .and(query_param("page_num", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "status": 0, "results": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = PoiSource::new(
        "39.5,116.2,41.0,117.4".parse().unwrap(),
        "学校".to_string(),
        "test-ak".to_string(),
    )
    .with_endpoint(format!("{}/place/v2/search", server.uri()));
    let driver = PagedDriver::new(source, fetcher(0));

    let results = run(&driver, &CrawlRequest::default()).await;

    assert_eq!(results.len(), 2);
    let first = results[0].as_ref().unwrap();
    assert_eq!(first.get_str("name"), Some("北京四中"));
    assert_eq!(first.get_str("category"), Some("学校"));
    let lng = first.get_f64("longitude").unwrap();
    assert!(lng < 116.38 && lng > 116.36);
    assert!(driver.exports_geometry());
}

#[tokio::test]
async fn test_poi_api_error_is_page_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/place/v2/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 240,
            "message": "APP 服务被禁用"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let source = PoiSource::new(
        "39.5,116.2,41.0,117.4".parse().unwrap(),
        "医院".to_string(),
        "bad-ak".to_string(),
    )
    .with_endpoint(format!("{}/place/v2/search", server.uri()));
    let driver = PagedDriver::new(source, fetcher(0));
    let request = CrawlRequest {
        max_pages: Some(2),
        ..Default::default()
    };

    let results = run(&driver, &request).await;

    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(CrawlError::PageParse { .. }))));
}
