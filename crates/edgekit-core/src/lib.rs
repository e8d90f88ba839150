//! Shared types for the edgekit device service SDK.
//!
//! This crate carries everything the client and service crates have in
//! common: the error taxonomy, name/value pair lists, the typed
//! configuration record, the metadata object model and event payloads.

pub mod config;
pub mod error;
pub mod event;
pub mod models;
pub mod nvpairs;

pub use config::{Config, DeviceSettings, Endpoint, Endpoints, LoggingSettings, ServiceSettings};
pub use error::{Error, Result};
pub use event::{CommandValue, CookedEvent, Reading};
pub use models::{
    Addressable, AdminState, AutoEvent, Device, DeviceProfile, DeviceResource,
    DeviceServiceRecord, OperatingState, ProvisionWatcher,
};
pub use nvpairs::{NvPair, NvPairs, Protocols};

/// Current time in milliseconds since the epoch, the origin format used by
/// the metadata and data services.
pub fn time_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
