//! Metadata object model: devices, profiles, watchers and the records the
//! service reconciles against the metadata registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::nvpairs::Protocols;

/// Administrative state of a device or service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdminState {
    Locked,
    #[default]
    Unlocked,
}

/// Operational state of a device or service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperatingState {
    #[default]
    Enabled,
    Disabled,
}

/// A network endpoint other services can call, as recorded in metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressable {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub protocol: String,
    pub method: String,
    pub address: String,
    pub port: u16,
    pub path: String,
    /// Creation timestamp in milliseconds.
    #[serde(default)]
    pub origin: u64,
}

/// The metadata record describing this device service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceServiceRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub operating_state: OperatingState,
    pub admin_state: AdminState,
    #[serde(default)]
    pub created: u64,
    pub addressable: Addressable,
}

/// Value type of a device resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ValueType {
    Bool,
    Int,
    Uint,
    Float,
    #[default]
    String,
    Binary,
}

/// Read/write properties of a device resource value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValue {
    #[serde(default)]
    pub value_type: ValueType,
    /// `"R"`, `"W"` or `"RW"`.
    #[serde(default = "default_read_write")]
    pub read_write: String,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub base: Option<f64>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub offset: Option<f64>,
}

fn default_read_write() -> String {
    "RW".to_string()
}

impl Default for PropertyValue {
    fn default() -> Self {
        Self {
            value_type: ValueType::default(),
            read_write: default_read_write(),
            units: None,
            base: None,
            scale: None,
            offset: None,
        }
    }
}

impl PropertyValue {
    pub fn readable(&self) -> bool {
        self.read_write.contains('R')
    }

    pub fn writable(&self) -> bool {
        self.read_write.contains('W')
    }
}

/// One resource a profile exposes; commands are derived from resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceResource {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: PropertyValue,
}

/// Schema describing a device's resources and commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "deviceResources")]
    pub resources: Vec<DeviceResource>,
}

impl DeviceProfile {
    /// Resolve a command by resource name. `for_get` selects by readability,
    /// otherwise by writability.
    pub fn command(&self, resource: &str, for_get: bool) -> Option<&DeviceResource> {
        self.resources.iter().find(|r| {
            r.name == resource
                && if for_get {
                    r.properties.readable()
                } else {
                    r.properties.writable()
                }
        })
    }
}

/// Autoevent descriptor: read a resource periodically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoEvent {
    pub resource: String,
    /// Interval between reads, e.g. `"10s"` or `"500ms"`.
    pub frequency: String,
    #[serde(default)]
    pub on_change: bool,
}

impl AutoEvent {
    /// Parse the frequency string into a duration. Supported suffixes are
    /// `ms`, `s`, `m` and `h`.
    pub fn interval(&self) -> Option<Duration> {
        parse_frequency(&self.frequency)
    }
}

/// Parse a frequency string such as `"10s"`, `"500ms"`, `"2m"` or `"1h"`.
pub fn parse_frequency(s: &str) -> Option<Duration> {
    let (digits, unit) = s.split_at(s.find(|c: char| !c.is_ascii_digit())?);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}

/// A managed device.
///
/// The profile is shared by reference: every handle to the device keeps the
/// profile alive, and the profile is released when the last holder drops it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub operating_state: OperatingState,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub protocols: Protocols,
    #[serde(default)]
    pub auto_events: Vec<AutoEvent>,
    pub profile: Arc<DeviceProfile>,
}

/// A rule describing which discovered devices should be auto-admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionWatcher {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub profile_name: String,
    /// Protocol-match rules applied to discovered endpoints.
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
    /// When set, a matching discovery blocks admission instead.
    #[serde(default)]
    pub blocking: bool,
}
