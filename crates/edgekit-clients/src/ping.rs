//! Readiness probe for required north-bound services.

use std::time::Duration;

use edgekit_core::{Endpoint, Error, Result};

/// Probe `endpoint` until it answers its ping route.
///
/// Issues up to `retries + 1` GETs against `/api/v1/ping`, sleeping `delay`
/// between attempts. Bring-up is sequential, so a long probe deliberately
/// blocks the caller; there is no cancellation.
pub async fn ping_endpoint(
    client: &reqwest::Client,
    service_name: &str,
    endpoint: &Endpoint,
    retries: u32,
    delay: Duration,
) -> Result<()> {
    if !endpoint.is_set() {
        return Err(Error::BadConfig(format!(
            "missing endpoint for {service_name} service"
        )));
    }

    let url = format!("{}/api/v1/ping", endpoint.base_url());
    let mut remaining = retries;
    loop {
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    "Found {} service at {}:{}",
                    service_name,
                    endpoint.host,
                    endpoint.port
                );
                return Ok(());
            }
            Ok(response) => {
                tracing::debug!("Ping {} returned {}", service_name, response.status());
            }
            Err(e) => {
                tracing::debug!("Ping {} failed: {}", service_name, e);
            }
        }
        if remaining == 0 {
            break;
        }
        remaining -= 1;
        tokio::time::sleep(delay).await;
    }

    tracing::error!(
        "Can't connect to {} service at {}:{}",
        service_name,
        endpoint.host,
        endpoint.port
    );
    Err(Error::RemoteServerDown(format!(
        "{service_name} at {}:{}",
        endpoint.host, endpoint.port
    )))
}
