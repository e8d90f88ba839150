//! In-process mock of the north-bound platform: metadata, data and a
//! Consul-compatible registry on one listener, with an operation log the
//! tests assert ordering and counts against.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use edgekit_core::{CommandValue, Device, DeviceResource, NvPairs, Result};
use edgekit_service::ProtocolDriver;

#[derive(Default)]
pub struct MockState {
    ops: Mutex<Vec<String>>,
    pub device_service: Mutex<Option<Value>>,
    pub devices: Mutex<Value>,
    pub devices_by_id: Mutex<HashMap<String, Value>>,
    pub profiles: Mutex<HashMap<String, Value>>,
    pub kv: Mutex<HashMap<String, String>>,
    /// service name -> port, all on 127.0.0.1
    pub catalog: Mutex<HashMap<String, u16>>,
    /// When set, the create_device handler probes the service's callback
    /// route and records whether it answered.
    pub callback_probe_port: Mutex<Option<u16>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        let state = Self {
            devices: Mutex::new(json!([])),
            ..Default::default()
        };
        Arc::new(state)
    }

    pub fn record(&self, op: impl Into<String>) {
        self.ops.lock().unwrap().push(op.into());
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count_ops(&self, prefix: &str) -> usize {
        self.ops()
            .iter()
            .filter(|op| op.starts_with(prefix))
            .count()
    }

    pub fn op_index(&self, prefix: &str) -> Option<usize> {
        self.ops().iter().position(|op| op.starts_with(prefix))
    }
}

pub async fn spawn_mock(state: Arc<MockState>) -> u16 {
    let app = Router::new()
        .route("/api/v1/ping", get(|| async { "pong" }))
        .route("/api/v1/deviceservice/name/:name", get(get_device_service))
        .route("/api/v1/deviceservice", post(create_device_service))
        .route("/api/v1/addressable/name/:name", get(get_addressable))
        .route(
            "/api/v1/addressable",
            post(create_addressable).put(update_addressable),
        )
        .route("/api/v1/device/servicename/:name", get(get_devices))
        .route("/api/v1/device/name/:name", get(get_device_by_name))
        .route("/api/v1/device/:id", get(get_device_by_id))
        .route("/api/v1/device", post(create_device))
        .route("/api/v1/provisionwatcher/servicename/:name", get(get_watchers))
        .route("/api/v1/deviceprofile/name/:name", get(get_profile))
        .route("/api/v1/deviceprofile", post(create_profile))
        .route("/api/v1/event", post(add_event))
        .route("/v1/status/leader", get(leader))
        .route("/v1/kv/*key", get(kv_get).put(kv_put))
        .route("/v1/catalog/service/:name", get(catalog_service))
        .route("/v1/agent/service/register", put(register_service))
        .route("/v1/agent/service/deregister/:name", put(deregister_service))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr.port()
}

async fn get_device_service(State(s): State<Arc<MockState>>, Path(_n): Path<String>) -> Response {
    s.record("get_deviceservice");
    match s.device_service.lock().unwrap().clone() {
        Some(v) => Json(v).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn create_device_service(State(s): State<Arc<MockState>>, Json(_v): Json<Value>) -> String {
    s.record("create_deviceservice");
    "ds-id".to_string()
}

async fn get_addressable(State(s): State<Arc<MockState>>, Path(_n): Path<String>) -> Response {
    s.record("get_addressable");
    StatusCode::NOT_FOUND.into_response()
}

async fn create_addressable(State(s): State<Arc<MockState>>, Json(v): Json<Value>) -> String {
    s.record(format!("create_addressable:{}", v["port"]));
    "addr-id".to_string()
}

async fn update_addressable(State(s): State<Arc<MockState>>, Json(v): Json<Value>) -> StatusCode {
    s.record(format!("update_addressable:{}", v["port"]));
    StatusCode::OK
}

async fn get_devices(State(s): State<Arc<MockState>>, Path(_n): Path<String>) -> Json<Value> {
    s.record("get_devices");
    Json(s.devices.lock().unwrap().clone())
}

async fn get_device_by_name(State(s): State<Arc<MockState>>, Path(name): Path<String>) -> Response {
    s.record(format!("get_device_by_name:{name}"));
    StatusCode::NOT_FOUND.into_response()
}

async fn get_device_by_id(State(s): State<Arc<MockState>>, Path(id): Path<String>) -> Response {
    s.record(format!("get_device:{id}"));
    match s.devices_by_id.lock().unwrap().get(&id).cloned() {
        Some(v) => Json(v).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn create_device(State(s): State<Arc<MockState>>, Json(v): Json<Value>) -> String {
    let probe_port = *s.callback_probe_port.lock().unwrap();
    if let Some(port) = probe_port {
        let reachable = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/api/v1/callback"))
            .json(&json!({"id": "", "type": "PROFILE"}))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        s.record(format!("callback_reachable:{reachable}"));
    }
    s.record(format!(
        "create_device:{}",
        v["name"].as_str().unwrap_or_default()
    ));
    "dev-id".to_string()
}

async fn get_watchers(State(s): State<Arc<MockState>>, Path(_n): Path<String>) -> Json<Value> {
    s.record("get_watchers");
    Json(json!([]))
}

async fn get_profile(State(s): State<Arc<MockState>>, Path(name): Path<String>) -> Response {
    s.record(format!("get_profile:{name}"));
    match s.profiles.lock().unwrap().get(&name).cloned() {
        Some(v) => Json(v).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn create_profile(State(s): State<Arc<MockState>>, Json(v): Json<Value>) -> String {
    s.record(format!(
        "create_profile:{}",
        v["name"].as_str().unwrap_or_default()
    ));
    "prof-id".to_string()
}

async fn add_event(State(s): State<Arc<MockState>>, Json(v): Json<Value>) -> String {
    s.record(format!(
        "add_event:{}",
        v["device"].as_str().unwrap_or_default()
    ));
    "event-id".to_string()
}

async fn leader(State(s): State<Arc<MockState>>) -> Json<Value> {
    s.record("registry_ping");
    Json(json!("127.0.0.1:8300"))
}

async fn kv_get(State(s): State<Arc<MockState>>, Path(key): Path<String>) -> Response {
    s.record("get_config");
    let kv = s.kv.lock().unwrap();
    let prefix = key.trim_end_matches('/');
    let entries: Vec<Value> = kv
        .iter()
        .filter(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| json!({"Key": k, "Value": base64::encode(v)}))
        .collect();
    if entries.is_empty() {
        StatusCode::NOT_FOUND.into_response()
    } else {
        Json(json!(entries)).into_response()
    }
}

async fn kv_put(State(s): State<Arc<MockState>>, Path(key): Path<String>, body: String) -> StatusCode {
    s.record(format!("kv_put:{key}"));
    s.kv.lock().unwrap().insert(key, body);
    StatusCode::OK
}

async fn catalog_service(State(s): State<Arc<MockState>>, Path(name): Path<String>) -> Json<Value> {
    s.record(format!("query_service:{name}"));
    match s.catalog.lock().unwrap().get(&name) {
        Some(port) => Json(json!([{
            "Address": "127.0.0.1",
            "ServiceAddress": "",
            "ServicePort": port,
        }])),
        None => Json(json!([])),
    }
}

async fn register_service(State(s): State<Arc<MockState>>, Json(_v): Json<Value>) -> StatusCode {
    s.record("register_service");
    StatusCode::OK
}

async fn deregister_service(State(s): State<Arc<MockState>>, Path(_n): Path<String>) -> StatusCode {
    s.record("deregister_service");
    StatusCode::OK
}

/// A driver scripted for the scenarios: records its lifecycle into the mock
/// operation log.
pub struct TestDriver {
    pub init_ok: bool,
    pub state: Arc<MockState>,
    pub init_calls: AtomicUsize,
    pub stopped: AtomicBool,
    /// When set, `initialize` probes the service's HTTP surface and records
    /// which routes answered.
    pub probe_port: Mutex<Option<u16>>,
}

impl TestDriver {
    pub fn new(state: Arc<MockState>) -> Arc<Self> {
        Arc::new(Self {
            init_ok: true,
            state,
            init_calls: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            probe_port: Mutex::new(None),
        })
    }

    pub fn rejecting(state: Arc<MockState>) -> Arc<Self> {
        Arc::new(Self {
            init_ok: false,
            state,
            init_calls: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            probe_port: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ProtocolDriver for TestDriver {
    async fn initialize(&self, _config: &NvPairs) -> bool {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let probe_port = *self.probe_port.lock().unwrap();
        if let Some(port) = probe_port {
            let client = reqwest::Client::new();
            let ping = client
                .get(format!("http://127.0.0.1:{port}/api/v1/ping"))
                .send()
                .await
                .map(|r| r.status().as_u16())
                .unwrap_or(0);
            let callback = client
                .post(format!("http://127.0.0.1:{port}/api/v1/callback"))
                .json(&json!({"id": "", "type": "PROFILE"}))
                .send()
                .await
                .map(|r| r.status().as_u16())
                .unwrap_or(0);
            self.state
                .record(format!("driver_init_probe:ping={ping},callback={callback}"));
        }
        self.state.record("driver_init");
        self.init_ok
    }

    async fn handle_get(
        &self,
        _device: &Device,
        _resource: &DeviceResource,
    ) -> Result<Vec<CommandValue>> {
        Ok(vec![CommandValue::Integer(1)])
    }

    async fn handle_put(
        &self,
        _device: &Device,
        _resource: &DeviceResource,
        _values: &[CommandValue],
    ) -> Result<()> {
        Ok(())
    }

    async fn stop(&self, _force: bool) {
        self.stopped.store(true, Ordering::SeqCst);
        self.state.record("driver_stop");
    }
}

/// A device record as metadata would return it.
pub fn device_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "adminState": "UNLOCKED",
        "operatingState": "ENABLED",
        "profile": counter_profile_json(),
    })
}

pub fn counter_profile_json() -> Value {
    json!({
        "id": "prof-1",
        "name": "Counter",
        "deviceResources": [
            {"name": "count", "properties": {"valueType": "Int", "readWrite": "R"}}
        ]
    })
}

/// Write a configuration file naming the mock as every endpoint.
pub fn write_config(confdir: &std::path::Path, mock_port: u16, service_port: u16, extra: &str) {
    let toml = format!(
        r#"
[Service]
Host = "127.0.0.1"
Port = {service_port}
ConnectRetries = 0
Timeout = 1

[Clients]
  [Clients.Data]
  Host = "127.0.0.1"
  Port = {mock_port}
  [Clients.Metadata]
  Host = "127.0.0.1"
  Port = {mock_port}
{extra}
"#
    );
    std::fs::write(confdir.join("configuration.toml"), toml).unwrap();
}
