//! The south-bound driver interface.

use async_trait::async_trait;

use edgekit_core::{CommandValue, Device, DeviceResource, NvPairs, Result};

/// A protocol-specific driver.
///
/// The lifecycle engine calls `initialize` once during bring-up and `stop`
/// once during shutdown; get/put handlers run concurrently from command
/// requests and autoevents.
#[async_trait]
pub trait ProtocolDriver: Send + Sync {
    /// Configure the driver. Receives the `Driver` section of the effective
    /// configuration. Returning `false` aborts bring-up.
    async fn initialize(&self, config: &NvPairs) -> bool;

    /// Read the named resource from a device.
    async fn handle_get(
        &self,
        device: &Device,
        resource: &DeviceResource,
    ) -> Result<Vec<CommandValue>>;

    /// Write values to the named resource of a device.
    async fn handle_put(
        &self,
        device: &Device,
        resource: &DeviceResource,
        values: &[CommandValue],
    ) -> Result<()>;

    /// Run one discovery pass. Invocations are serialized by the service;
    /// drivers without discovery support keep the default no-op.
    async fn discover(&self) {}

    /// Stop the driver. `force` requests immediate teardown without
    /// waiting for in-flight device traffic.
    async fn stop(&self, force: bool);
}
