//! HTTP point reads
//!
//! An HTTP point is a single GET returning JSON. No session is kept; each poll
//! is an independent request with the device timeout.

use std::time::Duration;

use acq_model::Reading;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct HttpReader {
    client: reqwest::Client,
}

impl HttpReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` and convert the JSON body into a reading
    ///
    /// Returns `Ok(None)` for a `null` body; objects are kept as JSON text.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<Option<Reading>> {
        let body: Value = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("HTTP {} -> {}", url, body);
        Ok(Reading::from_json(body))
    }
}
