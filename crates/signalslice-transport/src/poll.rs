//! HTTP polling client for the activity feed endpoint.

use std::time::Duration;

use reqwest::header::ACCEPT;
use signalslice_core::FeedSnapshot;
use url::Url;

use crate::endpoint::BackendEndpoint;
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    url: Url,
}

impl FeedClient {
    /// `timeout` bounds each request end to end.
    pub fn new(endpoint: &BackendEndpoint, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: endpoint.feed_url().clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch one snapshot, newest first.
    pub async fn fetch(&self) -> Result<FeedSnapshot, TransportError> {
        let response = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        let snapshot = FeedSnapshot::from_json(&body)?;
        tracing::debug!(items = snapshot.events().len(), "activity feed fetched");
        Ok(snapshot)
    }
}
