//! Control-surface handlers: ping, version, config, metrics, device
//! commands and discovery.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;

use edgekit_core::{time_millis, AdminState, CommandValue, OperatingState};

use crate::http::{HandlerRequest, HandlerResponse, RouteHandler};
use crate::service::{ServiceInner, API_DEVICE, SDK_VERSION};

/// Plain-text liveness probe; answers with the service version.
pub(crate) struct PingHandler {
    version: String,
}

impl PingHandler {
    pub fn new(version: String) -> Self {
        Self { version }
    }
}

#[async_trait]
impl RouteHandler for PingHandler {
    async fn handle(&self, _request: HandlerRequest) -> HandlerResponse {
        HandlerResponse::ok_text(self.version.clone())
    }
}

/// Service and SDK version report.
pub(crate) struct VersionHandler {
    version: String,
}

impl VersionHandler {
    pub fn new(version: String) -> Self {
        Self { version }
    }
}

#[async_trait]
impl RouteHandler for VersionHandler {
    async fn handle(&self, _request: HandlerRequest) -> HandlerResponse {
        HandlerResponse::ok_json(&json!({
            "version": self.version,
            "sdk_version": SDK_VERSION,
        }))
    }
}

/// Current effective configuration as JSON.
pub(crate) struct ConfigHandler {
    inner: Arc<ServiceInner>,
}

impl ConfigHandler {
    pub fn new(inner: Arc<ServiceInner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RouteHandler for ConfigHandler {
    async fn handle(&self, _request: HandlerRequest) -> HandlerResponse {
        HandlerResponse::ok_json(&*self.inner.config_snapshot())
    }
}

/// Basic process metrics.
pub(crate) struct MetricsHandler {
    inner: Arc<ServiceInner>,
}

impl MetricsHandler {
    pub fn new(inner: Arc<ServiceInner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RouteHandler for MetricsHandler {
    async fn handle(&self, _request: HandlerRequest) -> HandlerResponse {
        let started = self.inner.start_time.load(Ordering::SeqCst);
        let admin = self
            .inner
            .admin_state
            .read()
            .map(|s| *s)
            .unwrap_or_default();
        let op = self.inner.op_state.read().map(|s| *s).unwrap_or_default();
        HandlerResponse::ok_json(&json!({
            "uptime_ms": time_millis().saturating_sub(started),
            "adminState": admin,
            "operatingState": op,
            "devices": self.inner.devices.len().await,
            "watchers": self.inner.watchers.len().await,
            "events_submitted": self.inner.pool.submitted(),
            "events_pending": self.inner.pool.pending(),
        }))
    }
}

/// The device command interface:
/// `GET/PUT /api/v1/device/{id}/{resource}` and
/// `GET/PUT /api/v1/device/name/{name}/{resource}`.
pub(crate) struct DeviceHandler {
    inner: Arc<ServiceInner>,
}

impl DeviceHandler {
    pub fn new(inner: Arc<ServiceInner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RouteHandler for DeviceHandler {
    async fn handle(&self, request: HandlerRequest) -> HandlerResponse {
        let suffix = request.path.strip_prefix(API_DEVICE).unwrap_or("");
        let segments: Vec<&str> = suffix.split('/').filter(|s| !s.is_empty()).collect();

        let (device, resource) = match segments.as_slice() {
            ["name", name, resource] => (self.inner.devices.get_by_name(name).await, *resource),
            [id, resource] => (self.inner.devices.get_by_id(id).await, *resource),
            _ => {
                return HandlerResponse::text(
                    StatusCode::BAD_REQUEST,
                    "expected {id}/{resource} or name/{name}/{resource}",
                )
            }
        };

        let Some(device) = device else {
            return HandlerResponse::text(StatusCode::NOT_FOUND, "no such device");
        };
        if device.admin_state == AdminState::Locked {
            return HandlerResponse::text(StatusCode::LOCKED, "device locked");
        }
        if device.operating_state == OperatingState::Disabled {
            return HandlerResponse::text(StatusCode::LOCKED, "device disabled");
        }

        if request.method == Method::GET {
            let Some(command) = device.profile.command(resource, true) else {
                return HandlerResponse::text(StatusCode::NOT_FOUND, "no such command");
            };
            match self.inner.driver.handle_get(&device, command).await {
                Ok(values) => {
                    let readings: Vec<_> = values
                        .iter()
                        .map(|value| json!({"resource": command.name, "value": value}))
                        .collect();
                    HandlerResponse::ok_json(&json!({
                        "device": device.name,
                        "readings": readings,
                    }))
                }
                Err(e) => {
                    tracing::error!("Device read {}/{} failed: {}", device.name, resource, e);
                    HandlerResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "driver error")
                }
            }
        } else if request.method == Method::PUT || request.method == Method::POST {
            let Some(command) = device.profile.command(resource, false) else {
                return HandlerResponse::text(StatusCode::NOT_FOUND, "no such command");
            };
            let Ok(mut body) =
                serde_json::from_slice::<HashMap<String, CommandValue>>(&request.body)
            else {
                return HandlerResponse::text(StatusCode::BAD_REQUEST, "bad request body");
            };
            let Some(value) = body.remove(resource).or_else(|| body.remove("value")) else {
                return HandlerResponse::text(
                    StatusCode::BAD_REQUEST,
                    "no value supplied for resource",
                );
            };
            match self
                .inner
                .driver
                .handle_put(&device, command, &[value])
                .await
            {
                Ok(()) => HandlerResponse::ok_text("ok"),
                Err(e) => {
                    tracing::error!("Device write {}/{} failed: {}", device.name, resource, e);
                    HandlerResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "driver error")
                }
            }
        } else {
            HandlerResponse::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
    }
}

/// Discovery trigger. Requests are serialized: a run already in progress is
/// reported, not queued twice.
pub(crate) struct DiscoveryHandler {
    inner: Arc<ServiceInner>,
}

impl DiscoveryHandler {
    pub fn new(inner: Arc<ServiceInner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RouteHandler for DiscoveryHandler {
    async fn handle(&self, _request: HandlerRequest) -> HandlerResponse {
        match self.inner.disco_lock.clone().try_lock_owned() {
            Ok(guard) => {
                let driver = self.inner.driver.clone();
                let submitted = self.inner.pool.submit(async move {
                    let _guard = guard;
                    driver.discover().await;
                });
                if submitted {
                    HandlerResponse::text(StatusCode::ACCEPTED, "Running discovery")
                } else {
                    HandlerResponse::text(StatusCode::SERVICE_UNAVAILABLE, "service stopping")
                }
            }
            Err(_) => HandlerResponse::text(StatusCode::ACCEPTED, "Discovery already running"),
        }
    }
}
