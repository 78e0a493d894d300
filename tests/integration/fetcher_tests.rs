//! Fetcher behavior against a mock server: retries, short-circuits,
//! identity, politeness and proxy cooldown

use crate::common::{fast_policy, fetcher, fetcher_with, TEST_AGENT};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sumi_harvest::fetch::{FetchError, FetchRequest, ProxyPool};
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let error = fetcher(2).fetch_text(url(&server, "/flaky")).await.unwrap_err();

    match error {
        FetchError::ExhaustedRetries { attempts, cause } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*cause, FetchError::HttpStatus(500)));
        }
        other => panic!("expected ExhaustedRetries, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let error = fetcher(3).fetch_text(url(&server, "/missing")).await.unwrap_err();
    assert!(matches!(error, FetchError::HttpStatus(404)));
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let body = fetcher(2).fetch_text(url(&server, "/page")).await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_sends_query_and_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page_num", "2"))
        .and(query_param("output", "json"))
        .and(header("user-agent", TEST_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let request = FetchRequest::get(url(&server, "/search"))
        .with_param("page_num", 2)
        .with_param("output", "json");
    let response = fetcher(0).fetch(&request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "{}");
}

#[tokio::test]
async fn test_politeness_delay_after_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut policy = fast_policy(0);
    policy.min_delay = 0.2;
    policy.max_delay = 0.3;
    let fetcher = fetcher_with(policy, None);

    let started = Instant::now();
    fetcher.fetch_text(url(&server, "/")).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_concurrency_limit_serializes_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .expect(2)
        .mount(&server)
        .await;

    let mut policy = fast_policy(0);
    policy.max_concurrent_requests = 1;
    let fetcher = fetcher_with(policy, None);

    let started = Instant::now();
    let (a, b) = tokio::join!(
        fetcher.fetch_text(url(&server, "/a")),
        fetcher.fetch_text(url(&server, "/b"))
    );
    a.unwrap();
    b.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_dead_proxy_is_cooled_down_and_request_goes_direct() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/via"))
        .respond_with(ResponseTemplate::new(200).set_body_string("direct"))
        .expect(1)
        .mount(&server)
        .await;

    // Nothing listens on port 1, so the proxy refuses the connection
    let pool = Arc::new(ProxyPool::new(["http://127.0.0.1:1"]));
    let fetcher = fetcher_with(fast_policy(1), Some(pool.clone()));

    let body = fetcher.fetch_text(url(&server, "/via")).await.unwrap();

    assert_eq!(body, "direct");
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.available_count(), 0);
    assert!(pool.next_proxy().is_none());
}
