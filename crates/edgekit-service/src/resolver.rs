//! Configuration resolution.
//!
//! Determines the effective configuration by merging file defaults with
//! registry-sourced overrides. On a first run against an empty registry the
//! file-derived flat configuration is uploaded, so subsequent starts read
//! the same set back.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use edgekit_clients::registry::ConfigUpdateFn;
use edgekit_clients::RegistryClient;
use edgekit_core::{Config, Error, NvPairs, Protocols, Result};

/// Environment variable overriding the registry ping retry count.
pub const ENV_RETRY_COUNT: &str = "edgex_registry_retry_count";
/// Environment variable overriding the delay between registry pings.
pub const ENV_RETRY_WAIT: &str = "edgex_registry_retry_wait";

const DEFAULT_REGISTRY_RETRIES: u32 = 5;
const DEFAULT_REGISTRY_WAIT_SECS: u64 = 1;

/// Inputs to configuration resolution.
pub struct ResolveParams<'a> {
    pub name: &'a str,
    pub profile: Option<&'a str>,
    pub confdir: &'a Path,
    /// `Some(url)` connects to that registry, `Some("")` discovers the URL
    /// from the configuration file, `None` runs file-only.
    pub registry_request: Option<String>,
    /// Raised at shutdown to end the config-watch subscription.
    pub stop: Arc<AtomicBool>,
    /// Invoked with the new flat configuration when the registry notifies
    /// of a change.
    pub on_update: ConfigUpdateFn,
}

/// The outcome of resolution: a fully-populated configuration record plus
/// the artifacts later bring-up stages consume.
pub struct ResolvedConfig {
    pub config: Config,
    /// The flat pair list the record was populated from.
    pub pairs: NvPairs,
    pub registry: Option<RegistryClient>,
    /// Devices declared in the configuration file, when it was read.
    pub device_list: Vec<ConfiguredDevice>,
}

/// A device descriptor from the file's `DeviceList` array.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfiguredDevice {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Profile")]
    pub profile: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Labels", default)]
    pub labels: Vec<String>,
    #[serde(rename = "Protocols", default)]
    pub protocols: std::collections::BTreeMap<String, std::collections::BTreeMap<String, toml::Value>>,
    #[serde(rename = "AutoEvents", default)]
    pub auto_events: Vec<ConfiguredAutoEvent>,
}

/// Autoevent declaration inside a `DeviceList` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfiguredAutoEvent {
    #[serde(rename = "Resource")]
    pub resource: String,
    #[serde(rename = "Frequency")]
    pub frequency: String,
    #[serde(rename = "OnChange", default)]
    pub on_change: bool,
}

impl ConfiguredDevice {
    /// Convert the declared protocol tables into the wire representation.
    pub fn protocol_properties(&self) -> Protocols {
        let mut protocols = Protocols::new();
        for (name, table) in &self.protocols {
            let mut pairs = NvPairs::new();
            for (key, value) in table {
                pairs.push(key.clone(), value_to_string(value));
            }
            protocols.push(name.clone(), pairs);
        }
        protocols
    }
}

/// Run the resolution algorithm.
pub async fn resolve(params: ResolveParams<'_>) -> Result<ResolvedConfig> {
    let mut file_table: Option<toml::Table> = None;
    let mut registry_url = params.registry_request;

    // An empty URL means the registry was requested without a location:
    // read the file first to discover one.
    if matches!(registry_url.as_deref(), Some("")) {
        let table = load_file(params.confdir, params.profile)?;
        registry_url = registry_url_from_file(&table);
        file_table = Some(table);
        if registry_url.is_none() {
            tracing::error!("Registry was requested but no location given");
            return Err(Error::InvalidArg(
                "registry requested but no location given".into(),
            ));
        }
    }

    let registry = match &registry_url {
        Some(url) => Some(RegistryClient::for_url(url)?),
        None => None,
    };

    let mut registry_pairs: Option<NvPairs> = None;
    let mut upload = false;

    if let Some(registry) = &registry {
        wait_for_registry(registry, registry_url.as_deref().unwrap_or_default()).await?;

        match registry.get_config(params.name, params.profile).await? {
            Some(pairs) => {
                registry_pairs = Some(pairs);
                let _watch = registry.watch_config(
                    params.name,
                    params.profile,
                    params.on_update.clone(),
                    params.stop.clone(),
                );
            }
            None => {
                tracing::info!("Unable to get configuration from registry.");
                tracing::info!("Will load from file.");
                upload = true;
            }
        }
    }

    let mut device_list = Vec::new();
    let pairs = match registry_pairs {
        Some(pairs) => pairs,
        None => {
            let table = match file_table.take() {
                Some(table) => table,
                None => load_file(params.confdir, params.profile)?,
            };
            let mut pairs = flatten(&table);
            device_list = parse_device_list(&table)?;
            if upload {
                if let Some(registry) = &registry {
                    tracing::info!("Uploading configuration to registry.");
                    apply_env_overrides(&mut pairs);
                    registry
                        .put_config(params.name, params.profile, &pairs)
                        .await?;
                }
            }
            pairs
        }
    };

    let mut config = Config::from_pairs(&pairs)?;

    if let Some(registry) = &registry {
        // Endpoint discovery failures are tolerated here; the file defaults
        // already parsed above may still name the endpoint, and a truly
        // missing one is caught by the readiness probe.
        for (service, slot) in [
            ("edgex-core-metadata", &mut config.endpoints.metadata),
            ("edgex-core-data", &mut config.endpoints.data),
            ("edgex-support-logging", &mut config.endpoints.logging),
        ] {
            match registry.query_service(service).await {
                Ok((host, port)) => {
                    slot.host = host;
                    slot.port = port;
                }
                Err(e) => tracing::debug!("Endpoint query for {} failed: {}", service, e),
            }
        }
    }

    Ok(ResolvedConfig {
        config,
        pairs,
        registry,
        device_list,
    })
}

async fn wait_for_registry(registry: &RegistryClient, url: &str) -> Result<()> {
    let retries = std::env::var(ENV_RETRY_COUNT)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_REGISTRY_RETRIES);
    let wait = std::env::var(ENV_RETRY_WAIT)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_REGISTRY_WAIT_SECS);

    let mut remaining = retries;
    loop {
        if registry.ping().await {
            tracing::info!("Found registry service at {}", url);
            return Ok(());
        }
        remaining -= 1;
        if remaining == 0 {
            tracing::error!("registry service not running at {}", url);
            return Err(Error::RemoteServerDown(format!("registry at {url}")));
        }
        tokio::time::sleep(Duration::from_secs(wait)).await;
    }
}

/// Path of the configuration file for a confdir/profile combination.
pub fn config_file_path(confdir: &Path, profile: Option<&str>) -> PathBuf {
    let mut path = confdir.to_path_buf();
    if let Some(profile) = profile {
        if !profile.is_empty() {
            path.push(profile);
        }
    }
    path.push("configuration.toml");
    path
}

/// Load and parse the TOML configuration file.
pub fn load_file(confdir: &Path, profile: Option<&str>) -> Result<toml::Table> {
    let path = config_file_path(confdir, profile);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| Error::BadConfig(format!("cannot read {}: {e}", path.display())))?;
    toml::from_str(&text)
        .map_err(|e| Error::BadConfig(format!("cannot parse {}: {e}", path.display())))
}

/// Registry location declared in the file's `[Registry]` table.
fn registry_url_from_file(table: &toml::Table) -> Option<String> {
    let registry = table.get("Registry")?.as_table()?;
    if let Some(url) = registry.get("Url").and_then(|v| v.as_str()) {
        if !url.is_empty() {
            return Some(url.to_string());
        }
    }
    let host = registry.get("Host")?.as_str()?;
    let port = registry.get("Port")?.as_integer()?;
    Some(format!("consul://{host}:{port}"))
}

/// Flatten a TOML table into `/`-separated flat pairs.
///
/// The structural `DeviceList` array is excluded; it is parsed separately.
/// Arrays of scalars join into a comma-separated value.
pub fn flatten(table: &toml::Table) -> NvPairs {
    let mut pairs = NvPairs::new();
    for (key, value) in table {
        if key == "DeviceList" {
            continue;
        }
        flatten_value(key, value, &mut pairs);
    }
    pairs
}

fn flatten_value(prefix: &str, value: &toml::Value, pairs: &mut NvPairs) {
    match value {
        toml::Value::Table(table) => {
            for (key, value) in table {
                flatten_value(&format!("{prefix}/{key}"), value, pairs);
            }
        }
        toml::Value::Array(items) => {
            if items.iter().all(|v| !matches!(v, toml::Value::Table(_))) {
                let joined: Vec<String> = items.iter().map(value_to_string).collect();
                pairs.push(prefix, joined.join(","));
            }
        }
        other => pairs.push(prefix, value_to_string(other)),
    }
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(n) => n.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        _ => String::new(),
    }
}

fn parse_device_list(table: &toml::Table) -> Result<Vec<ConfiguredDevice>> {
    match table.get("DeviceList") {
        Some(value) => value
            .clone()
            .try_into()
            .map_err(|e| Error::BadConfig(format!("DeviceList: {e}"))),
        None => Ok(Vec::new()),
    }
}

/// Apply environment overrides to a flat pair list before first upload: a
/// pair named `Section/Key` is replaced by `EDGEKIT_SECTION_KEY` when set.
pub fn apply_env_overrides(pairs: &mut NvPairs) {
    let names: Vec<String> = pairs.iter().map(|p| p.name.clone()).collect();
    for name in names {
        let env_key = format!("EDGEKIT_{}", name.replace('/', "_").to_uppercase());
        if let Ok(value) = std::env::var(&env_key) {
            pairs.set(&name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[Service]
Host = "edge-box"
Port = 49990
Labels = ["counter", "demo"]

[Registry]
Host = "localhost"
Port = 8500

[Clients]
  [Clients.Data]
  Host = "localhost"
  Port = 48080
  [Clients.Metadata]
  Host = "localhost"
  Port = 48081

[Driver]
Start = "1"

[[DeviceList]]
  Name = "Counter01"
  Profile = "Counter"
  Description = "counting device"
  Labels = ["counter"]
  [DeviceList.Protocols.Other]
    Address = "counter01"
  [[DeviceList.AutoEvents]]
    Resource = "count"
    Frequency = "10s"
"#;

    #[test]
    fn flatten_produces_expected_keys() {
        let table: toml::Table = toml::from_str(SAMPLE).unwrap();
        let pairs = flatten(&table);
        assert_eq!(pairs.value("Service/Host"), Some("edge-box"));
        assert_eq!(pairs.uint_value("Service/Port"), Some(49990));
        assert_eq!(pairs.value("Service/Labels"), Some("counter,demo"));
        assert_eq!(pairs.uint_value("Clients/Data/Port"), Some(48080));
        assert_eq!(pairs.value("Driver/Start"), Some("1"));
        assert_eq!(pairs.value("DeviceList"), None);
        assert!(pairs.iter().all(|p| !p.name.starts_with("DeviceList")));
    }

    #[test]
    fn device_list_parses_with_protocols_and_autoevents() {
        let table: toml::Table = toml::from_str(SAMPLE).unwrap();
        let devices = parse_device_list(&table).unwrap();
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.name, "Counter01");
        assert_eq!(device.profile, "Counter");
        let protocols = device.protocol_properties();
        assert_eq!(
            protocols.properties("Other").unwrap().value("Address"),
            Some("counter01")
        );
        assert_eq!(device.auto_events.len(), 1);
        assert_eq!(device.auto_events[0].frequency, "10s");
        assert!(!device.auto_events[0].on_change);
    }

    #[test]
    fn registry_url_discovery() {
        let table: toml::Table = toml::from_str(SAMPLE).unwrap();
        assert_eq!(
            registry_url_from_file(&table).as_deref(),
            Some("consul://localhost:8500")
        );

        let with_url: toml::Table =
            toml::from_str("[Registry]\nUrl = \"http://reg:8500\"").unwrap();
        assert_eq!(
            registry_url_from_file(&with_url).as_deref(),
            Some("http://reg:8500")
        );

        let empty: toml::Table = toml::from_str("").unwrap();
        assert_eq!(registry_url_from_file(&empty), None);
    }

    #[test]
    fn config_file_path_honors_profile() {
        let base = Path::new("/etc/edgekit");
        assert_eq!(
            config_file_path(base, None),
            Path::new("/etc/edgekit/configuration.toml")
        );
        assert_eq!(
            config_file_path(base, Some("lab")),
            Path::new("/etc/edgekit/lab/configuration.toml")
        );
    }

    #[test]
    fn env_overrides_replace_pairs() {
        let mut pairs = NvPairs::new()
            .with("Service/Port", "49990")
            .with("Service/Host", "from-file");
        std::env::set_var("EDGEKIT_SERVICE_HOST", "from-env");
        apply_env_overrides(&mut pairs);
        std::env::remove_var("EDGEKIT_SERVICE_HOST");
        assert_eq!(pairs.value("Service/Host"), Some("from-env"));
        assert_eq!(pairs.uint_value("Service/Port"), Some(49990));
    }

    #[test]
    fn missing_file_is_bad_config() {
        let err = load_file(Path::new("/nonexistent"), None).unwrap_err();
        assert_eq!(err.code(), "BAD_CONFIG");
    }
}
