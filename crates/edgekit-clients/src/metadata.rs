//! Client for the metadata registry.
//!
//! Lookups that can legitimately miss (service, addressable, device,
//! profile by name) map 404 to `None`; every other failure carries the name
//! of the operation that failed.

use serde::de::DeserializeOwned;
use serde::Serialize;

use edgekit_core::{
    Addressable, Device, DeviceProfile, DeviceServiceRecord, Error, ProvisionWatcher, Result,
};
use edgekit_core::Endpoint;

use crate::http_client;

/// Stateless client for the metadata service.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: reqwest::Client,
    base: String,
}

impl MetadataClient {
    pub fn new(endpoint: &Endpoint) -> Self {
        Self {
            client: http_client(),
            base: endpoint.base_url(),
        }
    }

    /// Fetch this service's registration record, if one exists.
    pub async fn device_service(&self, name: &str) -> Result<Option<DeviceServiceRecord>> {
        self.get_opt("get_deviceservice", &format!("/api/v1/deviceservice/name/{name}"))
            .await
    }

    /// Fetch a registered addressable by name.
    pub async fn addressable(&self, name: &str) -> Result<Option<Addressable>> {
        self.get_opt("get_addressable", &format!("/api/v1/addressable/name/{name}"))
            .await
    }

    /// Create an addressable; returns its metadata id.
    pub async fn create_addressable(&self, addr: &Addressable) -> Result<String> {
        self.post_for_id("create_addressable", "/api/v1/addressable", addr)
            .await
    }

    /// Update an existing addressable in place.
    pub async fn update_addressable(&self, addr: &Addressable) -> Result<()> {
        let url = format!("{}/api/v1/addressable", self.base);
        let response = self
            .client
            .put(&url)
            .json(addr)
            .send()
            .await
            .map_err(|e| transport("update_addressable", e))?;
        check_status("update_addressable", response).await.map(|_| ())
    }

    /// Create the device service record; returns its metadata id.
    pub async fn create_device_service(&self, record: &DeviceServiceRecord) -> Result<String> {
        self.post_for_id("create_deviceservice", "/api/v1/deviceservice", record)
            .await
    }

    /// All devices owned by the named service.
    pub async fn devices(&self, service_name: &str) -> Result<Vec<Device>> {
        self.get("get_devices", &format!("/api/v1/device/servicename/{service_name}"))
            .await
    }

    /// Fetch one device by metadata id.
    pub async fn device(&self, id: &str) -> Result<Option<Device>> {
        self.get_opt("get_device", &format!("/api/v1/device/{id}")).await
    }

    /// Fetch one device by name.
    pub async fn device_by_name(&self, name: &str) -> Result<Option<Device>> {
        self.get_opt("get_device", &format!("/api/v1/device/name/{name}"))
            .await
    }

    /// Create a device; returns its metadata id.
    pub async fn create_device(&self, device: &Device) -> Result<String> {
        self.post_for_id("create_device", "/api/v1/device", device).await
    }

    /// Provision watchers registered for the named service.
    pub async fn watchers(&self, service_name: &str) -> Result<Vec<ProvisionWatcher>> {
        self.get(
            "get_watchers",
            &format!("/api/v1/provisionwatcher/servicename/{service_name}"),
        )
        .await
    }

    /// Fetch a device profile by name.
    pub async fn profile_by_name(&self, name: &str) -> Result<Option<DeviceProfile>> {
        self.get_opt("get_deviceprofile", &format!("/api/v1/deviceprofile/name/{name}"))
            .await
    }

    /// Upload a device profile; returns its metadata id.
    pub async fn create_profile(&self, profile: &DeviceProfile) -> Result<String> {
        self.post_for_id("create_deviceprofile", "/api/v1/deviceprofile", profile)
            .await
    }

    async fn get<T: DeserializeOwned>(&self, operation: &'static str, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport(operation, e))?;
        let response = check_status(operation, response).await?;
        response.json().await.map_err(|e| transport(operation, e))
    }

    async fn get_opt<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport(operation, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(operation, response).await?;
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| transport(operation, e))
    }

    async fn post_for_id<B: Serialize>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<String> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport(operation, e))?;
        let response = check_status(operation, response).await?;
        response.text().await.map_err(|e| transport(operation, e))
    }
}

fn transport(operation: &'static str, e: reqwest::Error) -> Error {
    Error::Metadata {
        operation,
        reason: e.to_string(),
    }
}

async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Metadata {
        operation,
        reason: format!("status {status}: {body}"),
    })
}
