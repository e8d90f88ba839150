//! Client for the optional service registry (Consul-compatible).
//!
//! The registry stores flat configuration under
//! `v1/kv/edgekit/<service>[;<profile>]/…`, answers health pings on
//! `v1/status/leader`, and provides service registration and discovery
//! through the agent and catalog APIs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use edgekit_core::{Error, NvPairs, Result};

use crate::http_client;

/// How long a blocking config-watch query waits server-side.
const WATCH_WAIT: &str = "30s";

/// Callback invoked when the watched configuration changes.
pub type ConfigUpdateFn = Arc<dyn Fn(NvPairs) + Send + Sync>;

/// Client for a Consul-compatible registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct KvEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogService {
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "ServiceAddress", default)]
    service_address: String,
    #[serde(rename = "ServicePort")]
    service_port: u16,
}

impl RegistryClient {
    /// Connect to the registry at `url`. Accepts `consul://host:port` or a
    /// plain HTTP URL.
    pub fn for_url(url: &str) -> Result<Self> {
        let base = if let Some(rest) = url.strip_prefix("consul://") {
            format!("http://{rest}")
        } else if url.starts_with("http://") || url.starts_with("https://") {
            url.trim_end_matches('/').to_string()
        } else {
            return Err(Error::InvalidArg(format!(
                "unsupported registry URL {url:?}"
            )));
        };
        Ok(Self {
            client: http_client(),
            base,
        })
    }

    /// Liveness probe; used by the bring-up retry loop.
    pub async fn ping(&self) -> bool {
        let url = format!("{}/v1/status/leader", self.base);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }

    fn kv_prefix(name: &str, profile: Option<&str>) -> String {
        match profile {
            Some(p) if !p.is_empty() => format!("edgekit/{name};{p}"),
            _ => format!("edgekit/{name}"),
        }
    }

    /// Fetch the stored configuration for `name`, or `None` when the
    /// registry holds no keys for it (first run).
    pub async fn get_config(&self, name: &str, profile: Option<&str>) -> Result<Option<NvPairs>> {
        let prefix = Self::kv_prefix(name, profile);
        let url = format!("{}/v1/kv/{}/?recurse=true", self.base, prefix);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("get_config: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Registry(format!(
                "get_config: status {}",
                response.status()
            )));
        }
        let entries: Vec<KvEntry> = response
            .json()
            .await
            .map_err(|e| Error::Registry(format!("get_config: {e}")))?;
        let pairs = decode_entries(&prefix, entries);
        Ok(Some(pairs))
    }

    /// Watch the stored configuration for changes.
    ///
    /// Spawns a background task issuing blocking queries against the KV
    /// prefix. On each change the task rebuilds the flat pair list and
    /// invokes `on_update`; it exits once `stop` is raised.
    pub fn watch_config(
        &self,
        name: &str,
        profile: Option<&str>,
        on_update: ConfigUpdateFn,
        stop: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        let prefix = Self::kv_prefix(name, profile);
        let base = self.base.clone();
        // Blocking queries hold the connection open for WATCH_WAIT, so the
        // watcher needs a client with a longer timeout than the default.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .unwrap_or_default();

        tokio::spawn(async move {
            let url = format!("{base}/v1/kv/{prefix}/?recurse=true");
            let mut index: u64 = 0;
            loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let request = client
                    .get(&url)
                    .query(&[("index", index.to_string()), ("wait", WATCH_WAIT.into())]);
                let response = match request.send().await {
                    Ok(r) if r.status().is_success() => r,
                    _ => {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };
                let new_index = response
                    .headers()
                    .get("X-Consul-Index")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(index);
                let entries: Vec<KvEntry> = match response.json().await {
                    Ok(entries) => entries,
                    Err(_) => continue,
                };
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                if index != 0 && new_index != index {
                    tracing::info!("Configuration change notified by registry");
                    on_update(decode_entries(&prefix, entries));
                }
                index = new_index;
            }
            tracing::debug!("Configuration watch stopped");
        })
    }

    /// Upload a flat configuration snapshot, one KV entry per pair.
    pub async fn put_config(
        &self,
        name: &str,
        profile: Option<&str>,
        pairs: &NvPairs,
    ) -> Result<()> {
        let prefix = Self::kv_prefix(name, profile);
        for pair in pairs.iter() {
            let url = format!("{}/v1/kv/{}/{}", self.base, prefix, pair.name);
            let response = self
                .client
                .put(&url)
                .body(pair.value.clone())
                .send()
                .await
                .map_err(|e| Error::Registry(format!("put_config: {e}")))?;
            if !response.status().is_success() {
                return Err(Error::Registry(format!(
                    "put_config {}: status {}",
                    pair.name,
                    response.status()
                )));
            }
        }
        Ok(())
    }

    /// Register this service with its health check endpoint.
    pub async fn register_service(
        &self,
        name: &str,
        host: &str,
        port: u16,
        check_interval: &str,
    ) -> Result<()> {
        let url = format!("{}/v1/agent/service/register", self.base);
        let body = serde_json::json!({
            "Name": name,
            "Address": host,
            "Port": port,
            "Check": {
                "Name": format!("Health Check: {name}"),
                "HTTP": format!("http://{host}:{port}/api/v1/ping"),
                "Interval": check_interval,
            }
        });
        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("register_service: {e}")))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Registry(format!(
                "register_service: status {}",
                response.status()
            )))
        }
    }

    /// Remove this service's registration.
    pub async fn deregister_service(&self, name: &str) -> Result<()> {
        let url = format!("{}/v1/agent/service/deregister/{name}", self.base);
        let response = self
            .client
            .put(&url)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("deregister_service: {e}")))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Registry(format!(
                "deregister_service: status {}",
                response.status()
            )))
        }
    }

    /// Look up the host and port of another registered service.
    pub async fn query_service(&self, name: &str) -> Result<(String, u16)> {
        let url = format!("{}/v1/catalog/service/{name}", self.base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("query_service: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Registry(format!(
                "query_service {name}: status {}",
                response.status()
            )));
        }
        let services: Vec<CatalogService> = response
            .json()
            .await
            .map_err(|e| Error::Registry(format!("query_service: {e}")))?;
        let entry = services
            .into_iter()
            .next()
            .ok_or_else(|| Error::Registry(format!("query_service: {name} not registered")))?;
        let host = if entry.service_address.is_empty() {
            entry.address
        } else {
            entry.service_address
        };
        Ok((host, entry.service_port))
    }
}

fn decode_entries(prefix: &str, entries: Vec<KvEntry>) -> NvPairs {
    let mut pairs = NvPairs::new();
    for entry in entries {
        let name = entry
            .key
            .strip_prefix(prefix)
            .map(|k| k.trim_start_matches('/'))
            .unwrap_or(&entry.key);
        if name.is_empty() {
            continue;
        }
        let value = entry
            .value
            .as_deref()
            .and_then(|v| base64::decode(v).ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        pairs.push(name, value);
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_schemes() {
        assert_eq!(
            RegistryClient::for_url("consul://localhost:8500").unwrap().base,
            "http://localhost:8500"
        );
        assert_eq!(
            RegistryClient::for_url("http://reg:8500/").unwrap().base,
            "http://reg:8500"
        );
        assert!(RegistryClient::for_url("ftp://reg").is_err());
    }

    #[test]
    fn kv_prefix_includes_profile() {
        assert_eq!(
            RegistryClient::kv_prefix("counter", None),
            "edgekit/counter"
        );
        assert_eq!(
            RegistryClient::kv_prefix("counter", Some("lab")),
            "edgekit/counter;lab"
        );
        assert_eq!(
            RegistryClient::kv_prefix("counter", Some("")),
            "edgekit/counter"
        );
    }

    #[test]
    fn entries_decode_with_prefix_stripped() {
        let entries = vec![
            KvEntry {
                key: "edgekit/counter/Service/Port".into(),
                value: Some(base64::encode("49990")),
            },
            KvEntry {
                key: "edgekit/counter/Service/Host".into(),
                value: None,
            },
        ];
        let pairs = decode_entries("edgekit/counter", entries);
        assert_eq!(pairs.uint_value("Service/Port"), Some(49990));
        assert_eq!(pairs.value("Service/Host"), Some(""));
    }
}
