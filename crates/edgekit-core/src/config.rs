//! Typed effective-configuration record.
//!
//! The configuration resolver produces a flat name/value list (from the TOML
//! file or the registry) and populates this record from it. Flat keys use
//! `/`-separated paths mirroring the file layout, e.g. `Service/Port` or
//! `Clients/Metadata/Host`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::nvpairs::NvPairs;

/// Default port the service listens on.
pub const DEFAULT_PORT: u16 = 49990;

/// Default number of additional ping attempts against required services.
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Default delay between ping attempts, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 2;

/// Settings for the service itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Host address reported to metadata. When unset the OS node name is
    /// used.
    pub host: Option<String>,
    /// Port the control surface listens on.
    pub port: u16,
    /// Additional ping attempts against required services.
    pub connect_retries: u32,
    /// Delay between ping attempts, in seconds.
    pub timeout: u64,
    /// Registry health check interval, e.g. `"10s"`.
    pub check_interval: String,
    /// Labels recorded on the device service in metadata.
    pub labels: Vec<String>,
    /// Message logged once the service reaches the serving state.
    pub startup_msg: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            check_interval: "10s".to_string(),
            labels: Vec::new(),
            startup_msg: None,
        }
    }
}

impl ServiceSettings {
    /// Delay between ping attempts as a duration.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// One north-bound endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Whether both host and port have been configured.
    pub fn is_set(&self) -> bool {
        !self.host.is_empty() && self.port != 0
    }

    /// Base URL for the endpoint.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Endpoints of the north-bound platform services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoints {
    pub metadata: Endpoint,
    pub data: Endpoint,
    pub logging: Endpoint,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log file path, if file logging is enabled.
    pub file: Option<String>,
    /// Minimum level recorded by the configured sinks.
    pub level: String,
    /// Forward log entries to the support-logging service.
    pub use_remote: bool,
}

/// Device-handling settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Directory holding profile definition files. Defaults to the
    /// configuration directory when unset.
    pub profiles_dir: Option<String>,
    /// Apply profile value transforms when cooking readings.
    pub data_transform: bool,
}

/// The effective configuration of a running service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceSettings,
    pub endpoints: Endpoints,
    pub logging: LoggingSettings,
    pub device: DeviceSettings,
    /// Opaque driver configuration, passed verbatim to the driver's
    /// initialization callback.
    pub driver: NvPairs,
}

impl Config {
    /// Populate a configuration record from a flat pair list.
    ///
    /// Unknown keys are ignored so registry snapshots may carry more than
    /// the core consumes. A present-but-unparsable numeric field is a
    /// configuration error.
    pub fn from_pairs(pairs: &NvPairs) -> Result<Self> {
        let mut config = Config {
            service: ServiceSettings {
                host: pairs.value("Service/Host").map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        };

        if let Some(port) = pairs.value("Service/Port") {
            config.service.port = port
                .parse()
                .map_err(|_| Error::BadConfig(format!("Service/Port: invalid port {port:?}")))?;
        }
        if let Some(retries) = pairs.value("Service/ConnectRetries") {
            config.service.connect_retries = retries.parse().map_err(|_| {
                Error::BadConfig(format!("Service/ConnectRetries: invalid count {retries:?}"))
            })?;
        }
        if let Some(timeout) = pairs.value("Service/Timeout") {
            config.service.timeout = timeout.parse().map_err(|_| {
                Error::BadConfig(format!("Service/Timeout: invalid delay {timeout:?}"))
            })?;
        }
        if let Some(interval) = pairs.value("Service/CheckInterval") {
            config.service.check_interval = interval.to_string();
        }
        if let Some(labels) = pairs.value("Service/Labels") {
            config.service.labels = labels
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.service.startup_msg = pairs.value("Service/StartupMsg").map(str::to_string);

        for (table, slot) in [
            ("Metadata", &mut config.endpoints.metadata),
            ("Data", &mut config.endpoints.data),
            ("Logging", &mut config.endpoints.logging),
        ] {
            if let Some(host) = pairs.value(&format!("Clients/{table}/Host")) {
                slot.host = host.to_string();
            }
            if let Some(port) = pairs.value(&format!("Clients/{table}/Port")) {
                slot.port = port.parse().map_err(|_| {
                    Error::BadConfig(format!("Clients/{table}/Port: invalid port {port:?}"))
                })?;
            }
        }

        config.logging.file = pairs.value("Logging/File").map(str::to_string);
        config.logging.level = pairs
            .value("Logging/LogLevel")
            .unwrap_or("INFO")
            .to_string();
        config.logging.use_remote = pairs.bool_value("Logging/EnableRemote").unwrap_or(false);

        config.device.profiles_dir = pairs.value("Device/ProfilesDir").map(str::to_string);
        config.device.data_transform = pairs.bool_value("Device/DataTransform").unwrap_or(false);

        config.driver = pairs.strip_prefix("Driver/");

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat() -> NvPairs {
        NvPairs::new()
            .with("Service/Host", "edge-box")
            .with("Service/Port", "49990")
            .with("Service/ConnectRetries", "5")
            .with("Service/Timeout", "1")
            .with("Service/Labels", "modbus, south")
            .with("Service/StartupMsg", "counter service running")
            .with("Clients/Metadata/Host", "localhost")
            .with("Clients/Metadata/Port", "48081")
            .with("Clients/Data/Host", "localhost")
            .with("Clients/Data/Port", "48080")
            .with("Logging/LogLevel", "DEBUG")
            .with("Logging/EnableRemote", "false")
            .with("Device/DataTransform", "true")
            .with("Driver/InitCount", "3")
    }

    #[test]
    fn populates_all_sections() {
        let config = Config::from_pairs(&flat()).unwrap();
        assert_eq!(config.service.host.as_deref(), Some("edge-box"));
        assert_eq!(config.service.port, 49990);
        assert_eq!(config.service.connect_retries, 5);
        assert_eq!(config.service.labels, ["modbus", "south"]);
        assert_eq!(config.endpoints.metadata.port, 48081);
        assert_eq!(config.endpoints.data.base_url(), "http://localhost:48080");
        assert!(!config.endpoints.logging.is_set());
        assert_eq!(config.logging.level, "DEBUG");
        assert!(config.device.data_transform);
        assert_eq!(config.driver.int_value("InitCount"), Some(3));
    }

    #[test]
    fn defaults_apply_when_keys_absent() {
        let config = Config::from_pairs(&NvPairs::new()).unwrap();
        assert_eq!(config.service.port, DEFAULT_PORT);
        assert_eq!(config.service.connect_retries, DEFAULT_CONNECT_RETRIES);
        assert_eq!(config.logging.level, "INFO");
        assert!(config.driver.is_empty());
    }

    #[test]
    fn invalid_port_is_bad_config() {
        let pairs = NvPairs::new().with("Service/Port", "forty");
        let err = Config::from_pairs(&pairs).unwrap_err();
        assert_eq!(err.code(), "BAD_CONFIG");
    }
}
