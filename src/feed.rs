//! Upstream vehicle positions feed client

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL};
use reqwest::{Client, Url};
use tracing::debug;

use crate::{
    config::FeedConfig,
    errors::{FetchError, TrackerError},
    models::{FeedMessage, VehicleRecord},
};

/// Header carrying the API Management subscription key
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Source of vehicle snapshots for the poll loop
pub trait FeedSource: Send + Sync + 'static {
    /// Fetch the current set of vehicles
    fn fetch_snapshot(
        &self,
    ) -> impl Future<Output = Result<Vec<VehicleRecord>, FetchError>> + Send;
}

impl<T: FeedSource> FeedSource for Arc<T> {
    fn fetch_snapshot(
        &self,
    ) -> impl Future<Output = Result<Vec<VehicleRecord>, FetchError>> + Send {
        T::fetch_snapshot(self)
    }
}

/// HTTP client for the GTFS-realtime JSON feed
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    url: Url,
}

impl FeedClient {
    /// Create a new feed client
    ///
    /// Fails if the configuration has no API key, so a missing key surfaces
    /// at startup rather than on every fetch.
    pub fn new(config: &FeedConfig) -> Result<Self, TrackerError> {
        let url = Url::parse(&config.url).map_err(|e| TrackerError::ConfigurationError {
            message: format!("Invalid feed URL {}: {}", config.url, e),
        })?;

        let mut api_key = HeaderValue::from_str(config.api_key()?).map_err(|_| {
            TrackerError::ConfigurationError {
                message: "Feed API key is not a valid header value".to_string(),
            }
        })?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(SUBSCRIPTION_KEY_HEADER, api_key);
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(TrackerError::HttpClientError)?;

        Ok(Self { client, url })
    }

    /// Feed endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<VehicleRecord>, FetchError> {
        let response = self
            .client
            .get(self.url.clone())
            .query(&[("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let body = response.bytes().await?;
        debug!("Received {} bytes from feed", body.len());

        let feed: FeedMessage = serde_json::from_slice(&body)?;
        Ok(feed.into_records(Utc::now()))
    }
}

impl FeedSource for FeedClient {
    fn fetch_snapshot(
        &self,
    ) -> impl Future<Output = Result<Vec<VehicleRecord>, FetchError>> + Send {
        self.fetch()
    }
}
