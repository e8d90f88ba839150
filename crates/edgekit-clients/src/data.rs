//! Client for the data sink.

use edgekit_core::{CookedEvent, Endpoint, Error, Result};

use crate::http_client;

/// Stateless client for the core-data event ingestion API.
#[derive(Debug, Clone)]
pub struct DataClient {
    client: reqwest::Client,
    base: String,
}

impl DataClient {
    pub fn new(endpoint: &Endpoint) -> Self {
        Self {
            client: http_client(),
            base: endpoint.base_url(),
        }
    }

    /// Post one cooked event. The event is consumed regardless of outcome;
    /// failures are reported for the caller to log.
    pub async fn add_event(&self, event: CookedEvent) -> Result<()> {
        let url = format!("{}/api/v1/event", self.base);
        let response = self
            .client
            .post(&url)
            .json(&event)
            .send()
            .await
            .map_err(|e| Error::Data(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Data(format!("add_event: status {status}: {body}")))
        }
    }
}
