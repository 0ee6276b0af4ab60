use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response carrying the count for a single slug.
///
/// `GET /api/views?slug=...`, `PUT /api/views` and `POST /api/views` all
/// return this shape; for the increment it holds the post-increment value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewCountResponse {
    pub views: u64,
}

/// Response from the batch read endpoint.
///
/// The server defaults missing slugs to 0, but the client does not rely on
/// that: see `ViewsClient::get_views_batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchViewsResponse {
    pub views: HashMap<String, u64>,
}

/// Request body naming the slug to create or increment.
#[derive(Debug, Clone, Serialize)]
pub struct SlugRequest {
    pub slug: String,
}

/// Response from the sitewide visitor endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorsResponse {
    pub visitors: u64,
}
