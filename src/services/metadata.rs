//! Link metadata fetching.
//!
//! Talks to a microlink-compatible endpoint: `GET {endpoint}?url=<url>`
//! answers `{"status": "success", "data": {"title", "description",
//! "image": {"url"}, "publisher"}}`, or a non-success status with a
//! `message`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::types::bookmark::LinkMetadata;
use crate::types::errors::MetadataError;

const DEFAULT_FAILURE: &str = "Failed to fetch metadata";

/// Trait for anything that can describe a URL.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<LinkMetadata, MetadataError>;
}

#[derive(Debug, Deserialize)]
struct MicrolinkResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<MicrolinkData>,
}

#[derive(Debug, Deserialize)]
struct MicrolinkData {
    title: Option<String>,
    description: Option<String>,
    image: Option<MicrolinkImage>,
    publisher: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MicrolinkImage {
    url: Option<String>,
}

/// Accepts only absolute http(s) URLs with a host.
pub fn validate_url(url: &str) -> Result<Url, MetadataError> {
    let parsed = Url::parse(url.trim()).map_err(|_| MetadataError::InvalidUrl(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(MetadataError::InvalidUrl(url.to_string())),
    }
}

/// Interprets a metadata service response.
///
/// `success` is whether the HTTP status was 2xx. Blank strings count as
/// absent so callers can apply their own fallbacks.
pub fn parse_response(success: bool, body: &str) -> Result<LinkMetadata, MetadataError> {
    let parsed: Option<MicrolinkResponse> = serde_json::from_str(body).ok();

    if !success {
        let message = parsed
            .and_then(|r| r.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FAILURE.to_string());
        return Err(MetadataError::Service(message));
    }

    let data = parsed
        .ok_or_else(|| MetadataError::Malformed("response is not JSON".to_string()))?
        .data
        .ok_or_else(|| MetadataError::Malformed("missing data".to_string()))?;

    let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    Ok(LinkMetadata {
        title: non_blank(data.title),
        description: non_blank(data.description),
        image_url: non_blank(data.image.and_then(|i| i.url)),
        publisher: non_blank(data.publisher),
    })
}

/// HTTP client for the microlink API.
pub struct MicrolinkClient {
    client: Client,
    endpoint: String,
}

impl MicrolinkClient {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self, MetadataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MetadataError::Network(e.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl MetadataSource for MicrolinkClient {
    async fn fetch(&self, url: &str) -> Result<LinkMetadata, MetadataError> {
        let target = validate_url(url)?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", target.as_str())])
            .send()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?;

        let success = response.status().is_success();
        let body = response
            .text()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?;

        tracing::debug!(url = %target, success, "metadata response received");
        parse_response(success, &body)
    }
}
