//! Whole runs: drivers feeding the batcher and landing in a sink

use crate::common::{article, fetcher, listing};
use std::path::Path;
use std::sync::Arc;
use sumi_harvest::config::load_config;
use sumi_harvest::harvest::{harvest_all, HarvestOptions};
use sumi_harvest::sources::{CrawlDriver, CrawlRequest, NewsSource, PagedDriver, PoiSource};
use sumi_harvest::storage::{FileExporter, MemorySink, SqliteSink};
use sumi_harvest::{Fetcher, RecordBatcher};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn place(name: &str) -> serde_json::Value {
    serde_json::json!({ "name": name, "location": { "lat": 39.9, "lng": 116.4 } })
}

async fn mount_poi_pages(server: &MockServer, pages: u32) {
    for page in 0..pages {
        Mock::given(method("GET"))
            .and(path("/place/v2/search"))
            .and(query_param("page_num", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 0,
                "results": [place(&format!("P{page}a")), place(&format!("P{page}b"))]
            })))
            .expect(1)
            .mount(server)
            .await;
    }
}

fn poi_driver(server: &MockServer) -> Box<dyn CrawlDriver> {
    let source = PoiSource::new(
        "39.5,116.2,41.0,117.4".parse().unwrap(),
        "公园".to_string(),
        "test-ak".to_string(),
    )
    .with_endpoint(format!("{}/place/v2/search", server.uri()));
    Box::new(PagedDriver::new(source, fetcher(0)))
}

#[tokio::test]
async fn test_records_flush_in_batches() {
    let server = MockServer::start().await;
    mount_poi_pages(&server, 3).await;

    let sink = Arc::new(MemorySink::new());
    let batcher = RecordBatcher::new(sink.clone(), 4);
    let request = CrawlRequest {
        max_pages: Some(3),
        ..Default::default()
    };

    let summaries = harvest_all(
        &[poi_driver(&server)],
        &request,
        &batcher,
        &CancellationToken::new(),
        &HarvestOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(sink.batch_sizes("poi_records"), vec![4, 2]);
    assert_eq!(sink.records("poi_records").len(), 6);
    assert_eq!(summaries[0].records_produced, 6);
    assert_eq!(summaries[0].records_persisted, 6);
    assert_eq!(summaries[0].pending, 0);
    assert_eq!(batcher.pending("poi_records").await, 0);
}

#[tokio::test]
async fn test_geojson_export_after_run() {
    let server = MockServer::start().await;
    mount_poi_pages(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/place/v2/search"))
        .and(query_param("page_num", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "status": 0, "results": [] })),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let batcher = RecordBatcher::new(Arc::new(MemorySink::new()), 10);
    let options = HarvestOptions {
        exporter: Some(Arc::new(FileExporter::new(
            None,
            Some(dir.path().to_path_buf()),
        ))),
        export_json: None,
    };

    harvest_all(
        &[poi_driver(&server)],
        &CrawlRequest::default(),
        &batcher,
        &CancellationToken::new(),
        &options,
    )
    .await
    .unwrap();

    let layer = std::fs::read_to_string(dir.path().join("poi_records.geojson")).unwrap();
    let layer: serde_json::Value = serde_json::from_str(&layer).unwrap();
    assert_eq!(layer["type"], "FeatureCollection");
    assert_eq!(layer["features"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_news_run_lands_in_sqlite() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news/node_1.htm"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[
            ("/news/content/1.htm", "化工厂爆炸", Some("2020-08-04")),
            ("/news/content/2.htm", "城区积水", Some("2020-08-05")),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/node_2.htm"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/content/1.htm"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(article("鄂尔多斯市一化工厂发生爆炸，损失约500万元")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/content/2.htm"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article("暴雨过后城区积水")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let sink = SqliteSink::open(&format!("sqlite://{}", db_path.display())).unwrap();
    let batcher = RecordBatcher::new(Arc::new(sink), 100);

    let driver: Box<dyn CrawlDriver> = Box::new(PagedDriver::new(
        NewsSource::with_base_url(format!("{}/", server.uri())),
        fetcher(0),
    ));
    let summaries = harvest_all(
        &[driver],
        &CrawlRequest::default(),
        &batcher,
        &CancellationToken::new(),
        &HarvestOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(summaries[0].records_persisted, 2);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let mut stmt = conn
        .prepare("SELECT title, disaster_type, loss FROM news_events ORDER BY id")
        .unwrap();
    let rows: Vec<(String, String, Option<String>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, "化工厂爆炸");
    assert_eq!(rows[0].1, "事故");
    let loss: serde_json::Value = serde_json::from_str(rows[0].2.as_deref().unwrap()).unwrap();
    assert_eq!(loss["unit"], "万元");
    assert_eq!(rows[1].1, "洪涝");
    assert_eq!(rows[1].2, None);
}

fn write_config(dir: &Path, proxy_file: &Path) -> std::path::PathBuf {
    let config = format!(
        r#"
[request-policy]
min-delay = 0.0
max-delay = 0.5
timeout = 10.0
max-retries = 2
backoff-multiplier = 1.5
max-concurrent-requests = 3

[proxy]
enabled = true
pool-file = "{}"

[user-agents]
pool = ["AgentA/1.0", "AgentB/2.0"]

[storage]
database-url = "sqlite::memory:"
batch-size = 25
"#,
        proxy_file.display()
    );
    let path = dir.join("harvest.toml");
    std::fs::write(&path, config).unwrap();
    path
}

#[test]
fn test_fetcher_built_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let proxy_file = dir.path().join("proxies.txt");
    std::fs::write(&proxy_file, "http://10.0.0.1:8080\nhttp://10.0.0.2:8080\n").unwrap();

    let config = load_config(&write_config(dir.path(), &proxy_file)).unwrap();
    assert_eq!(config.storage.batch_size, 25);
    assert_eq!(config.request_policy.proxy_cooldown, 300);

    let fetcher = Fetcher::from_config(&config).unwrap();
    assert_eq!(fetcher.proxies().map(|pool| pool.len()), Some(2));
    assert_eq!(fetcher.policy().retry().max_attempts(), 3);
}
