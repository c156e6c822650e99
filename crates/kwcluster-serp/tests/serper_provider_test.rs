//! Integration tests for the Serper provider against a mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use kwcluster_core::{FetchOutcome, SearchLocale, SerpError, SerpProvider};
use kwcluster_serp::{
    FetchPolicy, InMemoryRateLimiter, RateLimitBackend, RateLimiterConfig, SerpFetcher,
    SerperConfig, SerperProvider,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn organic(n: usize) -> serde_json::Value {
    let results: Vec<_> = (0..n)
        .map(|i| {
            serde_json::json!({
                "title": format!("Result {i}"),
                "link": format!("https://site{i}.example/page"),
                "snippet": "...",
                "position": i + 1
            })
        })
        .collect();
    serde_json::json!({ "searchParameters": {}, "organic": results })
}

fn provider(server: &MockServer) -> SerperProvider {
    SerperProvider::new(SerperConfig::new("test-key").with_base_url(server.uri()))
        .expect("Failed to create provider")
}

#[tokio::test]
async fn test_search_sends_key_and_locale() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("X-API-KEY", "test-key"))
        .and(body_partial_json(serde_json::json!({
            "q": "buy shoes",
            "gl": "ir",
            "hl": "fa",
            "num": 10,
            "location": "Germany"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(organic(10)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let locale = SearchLocale {
        location: Some("Germany".to_string()),
        ..SearchLocale::default()
    };
    let hits = provider(&mock_server)
        .search("buy shoes", &locale)
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 10);
    assert_eq!(hits[0].url, "https://site0.example/page");
    assert_eq!(hits[0].title, "Result 0");
}

#[tokio::test]
async fn test_search_maps_429_to_rate_limited() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let err = provider(&mock_server)
        .search("shoes", &SearchLocale::default())
        .await
        .unwrap_err();
    assert_eq!(err, SerpError::RateLimited);
}

#[tokio::test]
async fn test_search_maps_server_error_to_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let err = provider(&mock_server)
        .search("shoes", &SearchLocale::default())
        .await
        .unwrap_err();
    assert_eq!(err, SerpError::Status(503));
}

#[tokio::test]
async fn test_search_maps_bad_body_to_decode() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let err = provider(&mock_server)
        .search("shoes", &SearchLocale::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SerpError::Decode(_)));
}

#[tokio::test]
async fn test_fetcher_treats_short_page_as_insufficient() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(organic(4)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let limiter = Arc::new(InMemoryRateLimiter::new(
        RateLimiterConfig::default().with_backend(RateLimitBackend::Memory),
    ));
    let fetcher = SerpFetcher::new(
        Arc::new(provider(&mock_server)),
        limiter,
        SearchLocale::default(),
        FetchPolicy {
            transient_backoff: Duration::from_millis(10),
            rate_limit_backoff: Duration::from_millis(10),
            ..FetchPolicy::default()
        },
    );

    let result = fetcher.fetch("rare keyword").await;
    assert_eq!(result.outcome, FetchOutcome::Insufficient);
    assert!(result.links.is_empty());
}

#[tokio::test]
async fn test_fetcher_retries_after_429_then_succeeds() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(organic(10)))
        .mount(&mock_server)
        .await;

    let limiter = Arc::new(InMemoryRateLimiter::new(
        RateLimiterConfig::default().with_backend(RateLimitBackend::Memory),
    ));
    let fetcher = SerpFetcher::new(
        Arc::new(provider(&mock_server)),
        limiter,
        SearchLocale::default(),
        FetchPolicy {
            rate_limit_backoff: Duration::from_millis(10),
            ..FetchPolicy::default()
        },
    );

    let result = fetcher.fetch("shoes").await;
    assert_eq!(result.outcome, FetchOutcome::Success);
    assert_eq!(result.links.len(), 10);
}
