use crate::api::types::*;
use crate::error::{PageviewsError, PageviewsResult};
use crate::metrics::Metrics;
use base64::Engine;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, trace, warn};

/// HTTP client for the views API.
///
/// Exposes the four counter operations (read one, create/read, increment,
/// batch read) plus a convenience create-then-read fallback. Transient
/// failures are retried with linear backoff; the caller decides what a
/// terminal failure means (the core mechanism absorbs them).
pub struct ViewsClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
    auth_credentials: Option<(String, String)>,
    metrics: Option<Arc<Metrics>>,
}

impl ViewsClient {
    /// Create a new ViewsClient with default retry configuration
    pub fn new(base_url: String) -> PageviewsResult<Self> {
        Self::with_config(base_url, 3, Duration::from_millis(500), None, None)
    }

    /// Create a new ViewsClient with custom retry configuration
    pub fn with_config(
        base_url: String,
        max_retries: u32,
        retry_delay: Duration,
        auth_credentials: Option<(String, String)>,
        metrics: Option<Arc<Metrics>>,
    ) -> PageviewsResult<Self> {
        // Validate URL at construction time (fail fast on invalid URL)
        let _ = reqwest::Url::parse(&base_url)
            .map_err(|e| PageviewsError::InvalidArgument(format!("Invalid URL: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| {
                PageviewsError::IoError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
            retry_delay,
            auth_credentials,
            metrics,
        })
    }

    /// Create Authorization header for HTTP Basic Auth
    fn create_auth_header(&self) -> Option<String> {
        self.auth_credentials.as_ref().map(|(username, password)| {
            let credentials = format!("{}:{}", username, password);
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            format!("Basic {}", encoded)
        })
    }

    /// Execute request with automatic retry for transient failures
    async fn execute_with_retry<F, Fut>(
        &self,
        endpoint: &str,
        operation: F,
    ) -> Result<reqwest::Response, PageviewsError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if let Some(metrics) = &self.metrics {
                metrics.record_api_request(endpoint);
            }
            match operation().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            endpoint,
                            status = status.as_u16(),
                            attempt = attempt + 1,
                            "Server error, retrying"
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.record_api_retry();
                        }
                        sleep(self.retry_delay * (attempt + 1)).await;
                        continue;
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| self.retry_delay * (attempt + 1));

                        warn!(
                            endpoint,
                            retry_after_secs = retry_after.as_secs(),
                            attempt = attempt + 1,
                            "Rate limited"
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.record_api_retry();
                        }
                        sleep(retry_after).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    let api_error: PageviewsError = e.into();

                    if api_error.is_transient() && attempt < self.max_retries {
                        warn!(endpoint, attempt = attempt + 1, error = %api_error, "Retrying");
                        if let Some(metrics) = &self.metrics {
                            metrics.record_api_retry();
                        }
                        sleep(self.retry_delay * (attempt + 1)).await;
                        last_error = Some(api_error);
                    } else {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_api_failure(endpoint);
                        }
                        return Err(api_error);
                    }
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_api_failure(endpoint);
        }
        Err(last_error
            .unwrap_or_else(|| PageviewsError::NotReady("Retry limit exceeded".to_string())))
    }

    /// Check response status and convert non-success statuses into errors
    async fn check_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PageviewsError> {
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::UNAUTHORIZED {
            let message = response.text().await.unwrap_or_default();
            Err(PageviewsError::PermissionDenied(format!(
                "Authentication failed: {}",
                if message.is_empty() {
                    "Invalid credentials".to_string()
                } else {
                    message
                }
            )))
        } else {
            let message = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    return Err(PageviewsError::NetworkError(format!(
                        "Failed to read error response body: {}",
                        e
                    )));
                }
            };
            Err(PageviewsError::ApiError {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Generic GET request with query parameters that returns JSON
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, PageviewsError> {
        let response = self
            .execute_with_retry(endpoint, || {
                let mut req = self.client.get(url).query(query);
                if let Some(auth_header) = self.create_auth_header() {
                    req = req.header("Authorization", auth_header);
                }
                req.send()
            })
            .await?;
        let response = self.check_response(response).await?;
        response.json().await.map_err(Into::into)
    }

    /// Generic request with a JSON body that returns JSON
    async fn send_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        method: reqwest::Method,
        url: &str,
        body: &B,
    ) -> Result<T, PageviewsError> {
        let response = self
            .execute_with_retry(endpoint, || {
                let mut req = self.client.request(method.clone(), url).json(body);
                if let Some(auth_header) = self.create_auth_header() {
                    req = req.header("Authorization", auth_header);
                }
                req.send()
            })
            .await?;
        let response = self.check_response(response).await?;
        response.json().await.map_err(Into::into)
    }

    // =========================================================================
    // Counter operations
    // =========================================================================

    /// Read the current count for one slug.
    /// Returns `NotFound` if no counter row exists yet.
    #[instrument(skip(self), fields(api_op = "get_views"))]
    pub async fn get_views(&self, slug: &str) -> Result<u64, PageviewsError> {
        let url = format!("{}/api/views", self.base_url);

        match self
            .get_json::<ViewCountResponse>("/api/views", &url, &[("slug", slug)])
            .await
        {
            Ok(data) => {
                debug!(api_op = "get_views", slug, views = data.views);
                Ok(data.views)
            }
            Err(PageviewsError::ApiError { status: 404, .. }) => {
                Err(PageviewsError::NotFound(slug.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Idempotently create the counter row for a slug, initialized to zero,
    /// and return its current count.
    #[instrument(skip(self), fields(api_op = "create_views"))]
    pub async fn create_views(&self, slug: &str) -> Result<u64, PageviewsError> {
        let url = format!("{}/api/views", self.base_url);
        let request = SlugRequest {
            slug: slug.to_string(),
        };

        let data: ViewCountResponse = self
            .send_json("/api/views", reqwest::Method::PUT, &url, &request)
            .await?;
        debug!(api_op = "create_views", slug, views = data.views);
        Ok(data.views)
    }

    /// Read the count for a slug, creating the row if it does not exist.
    pub async fn get_or_create_views(&self, slug: &str) -> Result<u64, PageviewsError> {
        match self.get_views(slug).await {
            Ok(views) => Ok(views),
            Err(PageviewsError::NotFound(_)) => {
                trace!(slug, "No counter row, creating");
                self.create_views(slug).await
            }
            Err(e) => Err(e),
        }
    }

    /// Atomically increment the count for a slug and return the
    /// post-increment value. Creates the row if it does not exist.
    #[instrument(skip(self), fields(api_op = "increment_views"))]
    pub async fn increment_views(&self, slug: &str) -> Result<u64, PageviewsError> {
        let url = format!("{}/api/views", self.base_url);
        let request = SlugRequest {
            slug: slug.to_string(),
        };

        let data: ViewCountResponse = self
            .send_json("/api/views", reqwest::Method::POST, &url, &request)
            .await?;
        debug!(api_op = "increment_views", slug, views = data.views);
        if let Some(metrics) = &self.metrics {
            metrics.record_increment();
        }
        Ok(data.views)
    }

    /// Read the sitewide visitor count. The server creates the backing
    /// counter on first read, so this never returns `NotFound`.
    #[instrument(skip(self), fields(api_op = "get_visitors"))]
    pub async fn get_visitors(&self) -> Result<u64, PageviewsError> {
        let url = format!("{}/api/visitors", self.base_url);

        let data: VisitorsResponse = self.get_json("/api/visitors", &url, &[]).await?;
        debug!(api_op = "get_visitors", visitors = data.visitors);
        Ok(data.visitors)
    }

    /// Read counts for many slugs in one call.
    ///
    /// The returned map always contains every requested slug: slugs the
    /// store does not know about are reported as 0, whether or not the
    /// server included them in its response.
    #[instrument(skip(self, slugs), fields(api_op = "get_views_batch", count = slugs.len()))]
    pub async fn get_views_batch(
        &self,
        slugs: &[String],
    ) -> Result<HashMap<String, u64>, PageviewsError> {
        if slugs.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/api/views/batch", self.base_url);
        let joined = slugs.join(",");

        let data: BatchViewsResponse = self
            .get_json("/api/views/batch", &url, &[("slugs", joined.as_str())])
            .await?;

        let mut views = data.views;
        for slug in slugs {
            views.entry(slug.clone()).or_insert(0);
        }
        debug!(api_op = "get_views_batch", slugs = slugs.len());
        Ok(views)
    }
}
