//! WireMock server utilities for views API testing
//!
//! Provides helper functions to set up mock views API servers with various
//! configurations for testing different scenarios.

#![allow(dead_code)]

use pageviews::{
    Metrics, PageviewsError, PageviewsResult, Storage, SystemClock, ViewsClient, ViewsContext,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mount a single-slug read endpoint returning the given count.
pub async fn mount_get_views(server: &MockServer, slug: &str, views: u64) {
    Mock::given(method("GET"))
        .and(path("/api/views"))
        .and(query_param("slug", slug))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "views": views })),
        )
        .mount(server)
        .await;
}

/// Mount a single-slug read endpoint that reports the slug as unknown.
pub async fn mount_get_views_not_found(server: &MockServer, slug: &str) {
    Mock::given(method("GET"))
        .and(path("/api/views"))
        .and(query_param("slug", slug))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({ "error": "not found" })),
        )
        .mount(server)
        .await;
}

/// Mount the idempotent create endpoint for a slug.
pub async fn mount_create_views(server: &MockServer, slug: &str, views: u64) {
    Mock::given(method("PUT"))
        .and(path("/api/views"))
        .and(body_json(serde_json::json!({ "slug": slug })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "views": views })),
        )
        .mount(server)
        .await;
}

/// Mount the increment endpoint for a slug, returning the post-increment
/// count and asserting it is hit exactly `expected_calls` times.
pub async fn mount_increment_views(
    server: &MockServer,
    slug: &str,
    views_after: u64,
    expected_calls: u64,
) {
    Mock::given(method("POST"))
        .and(path("/api/views"))
        .and(body_json(serde_json::json!({ "slug": slug })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "views": views_after })),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Mount the batch read endpoint with a fixed response map.
pub async fn mount_batch_views(server: &MockServer, views: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/views/batch"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "views": views })),
        )
        .mount(server)
        .await;
}

/// Storage that fails every operation. Exercises the "durable storage is
/// unavailable" degradation paths.
#[derive(Debug, Default)]
pub struct FailingStorage;

impl Storage for FailingStorage {
    fn get_item(&self, _key: &str) -> PageviewsResult<Option<String>> {
        Err(PageviewsError::IoError("storage unavailable".to_string()))
    }

    fn set_item(&self, _key: &str, _value: &str) -> PageviewsResult<()> {
        Err(PageviewsError::IoError("storage unavailable".to_string()))
    }

    fn remove_item(&self, _key: &str) -> PageviewsResult<()> {
        Err(PageviewsError::IoError("storage unavailable".to_string()))
    }
}

/// Context wired for tests: in-memory storage, system clock, short debounce.
pub fn test_context(server_uri: String) -> Arc<ViewsContext> {
    test_context_with(
        server_uri,
        Arc::new(pageviews::MemoryStorage::new()),
        Arc::new(pageviews::MemoryStorage::new()),
        Duration::from_secs(300),
    )
}

/// Context wired for tests with explicit storages and cache TTL.
pub fn test_context_with(
    server_uri: String,
    durable_storage: Arc<dyn Storage>,
    session_storage: Arc<dyn Storage>,
    cache_ttl: Duration,
) -> Arc<ViewsContext> {
    let metrics = Arc::new(Metrics::new());
    let client = Arc::new(
        ViewsClient::with_config(
            server_uri,
            0,
            Duration::from_millis(10),
            None,
            Some(Arc::clone(&metrics)),
        )
        .expect("valid mock server URL"),
    );
    Arc::new(ViewsContext::new(
        client,
        durable_storage,
        session_storage,
        Arc::new(SystemClock),
        cache_ttl,
        Duration::from_millis(20),
        metrics,
    ))
}
