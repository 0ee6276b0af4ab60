//! Tests for the views API client: the four counter operations, the
//! create-then-read fallback, retry behavior, auth, and malformed
//! responses.

use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pageviews::{PageviewsError, ViewsClient};

mod common;
use common::mock_server::{mount_create_views, mount_get_views, mount_get_views_not_found};

fn fast_client(uri: String) -> ViewsClient {
    ViewsClient::with_config(uri, 3, Duration::from_millis(10), None, None).unwrap()
}

#[tokio::test]
async fn test_get_views_returns_count() {
    let server = MockServer::start().await;
    mount_get_views(&server, "hello-world", 41).await;

    let client = fast_client(server.uri());
    assert_eq!(client.get_views("hello-world").await.unwrap(), 41);
}

#[tokio::test]
async fn test_get_views_maps_404_to_not_found() {
    let server = MockServer::start().await;
    mount_get_views_not_found(&server, "brand-new-post").await;

    let client = fast_client(server.uri());
    let err = client.get_views("brand-new-post").await.unwrap_err();
    assert!(matches!(err, PageviewsError::NotFound(_)));
}

#[tokio::test]
async fn test_get_or_create_falls_back_to_create() {
    let server = MockServer::start().await;
    mount_get_views_not_found(&server, "brand-new-post").await;
    mount_create_views(&server, "brand-new-post", 0).await;

    let client = fast_client(server.uri());
    assert_eq!(client.get_or_create_views("brand-new-post").await.unwrap(), 0);
}

#[tokio::test]
async fn test_increment_returns_post_increment_value() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/views"))
        .and(body_json(serde_json::json!({ "slug": "hello-world" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "views": 42 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(server.uri());
    assert_eq!(client.increment_views("hello-world").await.unwrap(), 42);
}

#[tokio::test]
async fn test_get_visitors_returns_sitewide_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/visitors"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "visitors": 1234 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(server.uri());
    assert_eq!(client.get_visitors().await.unwrap(), 1234);
}

#[tokio::test]
async fn test_batch_fills_missing_slugs_with_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/views/batch"))
        .and(query_param("slugs", "a,b,c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "views": { "a": 5 }
        })))
        .mount(&server)
        .await;

    let client = fast_client(server.uri());
    let views = client
        .get_views_batch(&["a".to_string(), "b".to_string(), "c".to_string()])
        .await
        .unwrap();

    assert_eq!(views.get("a"), Some(&5));
    assert_eq!(views.get("b"), Some(&0));
    assert_eq!(views.get("c"), Some(&0));
}

#[tokio::test]
async fn test_batch_with_no_slugs_skips_network() {
    let server = MockServer::start().await;
    let client = fast_client(server.uri());

    let views = client.get_views_batch(&[]).await.unwrap();
    assert!(views.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let server = MockServer::start().await;
    // First attempt fails with 503, the retry succeeds
    Mock::given(method("GET"))
        .and(path("/api/views"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_get_views(&server, "hello-world", 41).await;

    let client = fast_client(server.uri());
    assert_eq!(client.get_views("hello-world").await.unwrap(), 41);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/views"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(server.uri());
    let err = client.get_views("hello-world").await.unwrap_err();
    assert!(matches!(err, PageviewsError::ApiError { status: 400, .. }));
}

#[tokio::test]
async fn test_basic_auth_header_is_sent() {
    let server = MockServer::start().await;
    // base64("user:pass")
    Mock::given(method("GET"))
        .and(path("/api/views"))
        .and(header("Authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "views": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ViewsClient::with_config(
        server.uri(),
        0,
        Duration::from_millis(10),
        Some(("user".to_string(), "pass".to_string())),
        None,
    )
    .unwrap();

    assert_eq!(client.get_views("hello-world").await.unwrap(), 1);
}

#[tokio::test]
async fn test_unauthorized_maps_to_permission_denied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/views"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = fast_client(server.uri());
    let err = client.get_views("hello-world").await.unwrap_err();
    assert!(matches!(err, PageviewsError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_malformed_response_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/views"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = fast_client(server.uri());
    let err = client.get_views("hello-world").await.unwrap_err();
    assert!(matches!(err, PageviewsError::ParseError(_)));
}

#[tokio::test]
async fn test_invalid_base_url_fails_fast() {
    assert!(ViewsClient::new("not a url".to_string()).is_err());
}
