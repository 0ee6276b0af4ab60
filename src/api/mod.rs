//! HTTP layer over the views API.

pub mod client;
pub mod types;

pub use client::ViewsClient;
