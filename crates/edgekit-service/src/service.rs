//! The device service lifecycle engine.
//!
//! A [`DeviceService`] coordinates one protocol driver with the north-bound
//! platform services. `start` runs the bring-up sequence (configuration
//! resolution, readiness probes, metadata reconciliation, device import,
//! driver initialization, handler registration, registry registration)
//! and `stop` unwinds it in order. At steady state the driver pushes
//! readings through [`DeviceService::post_readings`], metadata callbacks
//! mutate the device map, and the registry's config watch replaces the
//! effective configuration snapshot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::Method;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer as _;

use edgekit_clients::registry::ConfigUpdateFn;
use edgekit_clients::{
    ping_endpoint, DataClient, LogControl, MetadataClient, RegistryClient,
};
use edgekit_core::{
    time_millis, Addressable, AdminState, AutoEvent, CommandValue, Config, CookedEvent, Device,
    DeviceProfile, DeviceResource, DeviceServiceRecord, Error, NvPairs, OperatingState, Result,
};

use crate::args::ServiceArgs;
use crate::callback::CallbackHandler;
use crate::devmap::DeviceMap;
use crate::driver::ProtocolDriver;
use crate::handlers::{
    ConfigHandler, DeviceHandler, DiscoveryHandler, MetricsHandler, PingHandler, VersionHandler,
};
use crate::http::RestServer;
use crate::pool::{WorkerPool, POOL_WORKERS};
use crate::resolver::{self, ConfiguredDevice, ResolveParams, ResolvedConfig};
use crate::sched::Scheduler;
use crate::watchlist::WatchList;

/// SDK version reported on `/api/version`.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) const API_PING: &str = "/api/v1/ping";
pub(crate) const API_VERSION: &str = "/api/version";
pub(crate) const API_DISCOVERY: &str = "/api/v1/discovery";
pub(crate) const API_DEVICE: &str = "/api/v1/device/";
pub(crate) const API_CALLBACK: &str = "/api/v1/callback";
pub(crate) const API_CONFIG: &str = "/api/v1/config";
pub(crate) const API_METRICS: &str = "/api/v1/metrics";

/// Where the service is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    New,
    Configuring,
    BringUp,
    Loading,
    Serving,
    Stopping,
    Stopped,
    Failed,
}

pub(crate) struct ServiceInner {
    pub name: String,
    pub version: String,
    pub profile: Option<String>,
    pub confdir: PathBuf,
    registry_request: Option<String>,
    pub driver: Arc<dyn ProtocolDriver>,
    config: std::sync::RwLock<Arc<Config>>,
    pub devices: DeviceMap,
    pub watchers: WatchList,
    pub pool: WorkerPool,
    pub sched: Scheduler,
    pub server: tokio::sync::RwLock<Option<RestServer>>,
    metadata: std::sync::RwLock<Option<MetadataClient>>,
    data: std::sync::RwLock<Option<DataClient>>,
    registry: std::sync::RwLock<Option<RegistryClient>>,
    pub admin_state: std::sync::RwLock<AdminState>,
    pub op_state: std::sync::RwLock<OperatingState>,
    pub stop_config: Arc<AtomicBool>,
    pub disco_lock: Arc<tokio::sync::Mutex<()>>,
    pub start_time: AtomicU64,
    state: std::sync::RwLock<LifecycleState>,
    pub log_control: LogControl,
    autoevent_last: std::sync::Mutex<HashMap<String, Vec<CommandValue>>>,
}

impl ServiceInner {
    pub fn config_snapshot(&self) -> Arc<Config> {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn set_config(&self, config: Config) {
        if let Ok(mut slot) = self.config.write() {
            *slot = Arc::new(config);
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(LifecycleState::Failed)
    }

    fn set_state(&self, state: LifecycleState) {
        if let Ok(mut slot) = self.state.write() {
            *slot = state;
        }
    }

    pub fn metadata_client(&self) -> Option<MetadataClient> {
        self.metadata.read().ok().and_then(|c| c.clone())
    }

    fn data_client(&self) -> Option<DataClient> {
        self.data.read().ok().and_then(|c| c.clone())
    }

    fn registry_client(&self) -> Option<RegistryClient> {
        self.registry.read().ok().and_then(|c| c.clone())
    }

    /// Config-watch callback: replace the mutable parts of the effective
    /// configuration, keeping the fields fixed at bring-up.
    fn apply_config_update(self: &Arc<Self>, pairs: NvPairs) {
        let mut updated = match Config::from_pairs(&pairs) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring bad configuration update from registry: {}", e);
                return;
            }
        };
        let current = self.config_snapshot();
        updated.service.host = current.service.host.clone();
        updated.service.port = current.service.port;
        if !updated.endpoints.metadata.is_set() {
            updated.endpoints.metadata = current.endpoints.metadata.clone();
        }
        if !updated.endpoints.data.is_set() {
            updated.endpoints.data = current.endpoints.data.clone();
        }
        if !updated.endpoints.logging.is_set() {
            updated.endpoints.logging = current.endpoints.logging.clone();
        }
        if updated.device.profiles_dir.is_none() {
            updated.device.profiles_dir = current.device.profiles_dir.clone();
        }
        self.log_control.set_level(&updated.logging.level);
        self.set_config(updated);
        tracing::info!("Configuration updated from registry");
    }

    /// Register interval tasks for every autoevent a device declares.
    pub(crate) fn register_autoevents(self: &Arc<Self>, device: &Device) {
        for event in &device.auto_events {
            let Some(interval) = event.interval() else {
                tracing::warn!(
                    "Ignoring autoevent {}/{}: bad frequency {:?}",
                    device.name,
                    event.resource,
                    event.frequency
                );
                continue;
            };
            let id = autoevent_id(&device.name, &event.resource);
            let weak = Arc::downgrade(self);
            let device_name = device.name.clone();
            let resource = event.resource.clone();
            let on_change = event.on_change;
            self.sched.schedule(
                id,
                interval,
                Arc::new(move || {
                    let weak = weak.clone();
                    let device_name = device_name.clone();
                    let resource = resource.clone();
                    Box::pin(async move {
                        if let Some(inner) = weak.upgrade() {
                            inner.run_autoevent(&device_name, &resource, on_change).await;
                        }
                    })
                }),
            );
        }
    }

    /// Remove the interval tasks for a device leaving the map.
    pub(crate) fn remove_autoevents(&self, device: &Device) {
        for event in &device.auto_events {
            self.sched.remove(&autoevent_id(&device.name, &event.resource));
        }
        if let Ok(mut last) = self.autoevent_last.lock() {
            last.retain(|key, _| !key.starts_with(&format!("{}/", device.name)));
        }
    }

    async fn run_autoevent(self: &Arc<Self>, device_name: &str, resource: &str, on_change: bool) {
        let Some(device) = self.devices.get_by_name(device_name).await else {
            return;
        };
        let Some(command) = device.profile.command(resource, true) else {
            return;
        };
        match self.driver.handle_get(&device, command).await {
            Ok(values) => {
                if on_change {
                    let key = autoevent_id(device_name, resource);
                    let unchanged = self
                        .autoevent_last
                        .lock()
                        .map(|mut last| {
                            if last.get(&key) == Some(&values) {
                                true
                            } else {
                                last.insert(key, values.clone());
                                false
                            }
                        })
                        .unwrap_or(false);
                    if unchanged {
                        return;
                    }
                }
                self.submit_event(device_name, command, &values);
            }
            Err(e) => {
                tracing::error!("Autoevent read {}/{} failed: {}", device_name, resource, e);
            }
        }
    }

    /// Cook an event and queue it for posting. At most one work item per
    /// call.
    pub(crate) fn submit_event(
        &self,
        device_name: &str,
        command: &DeviceResource,
        values: &[CommandValue],
    ) {
        let config = self.config_snapshot();
        let event = CookedEvent::cook(device_name, command, values, config.device.data_transform);
        let Some(data) = self.data_client() else {
            tracing::error!("Event dropped: data client not configured");
            return;
        };
        self.pool.submit(async move {
            if let Err(e) = data.add_event(event).await {
                tracing::error!("Failed to post event: {}", e);
            }
        });
    }
}

fn autoevent_id(device: &str, resource: &str) -> String {
    format!("{device}/{resource}")
}

/// A device service instance.
pub struct DeviceService {
    inner: Arc<ServiceInner>,
}

impl DeviceService {
    /// Create a service with defaults. `args` override the name and
    /// configuration location; the service is inert until `start`.
    pub fn new(
        default_name: &str,
        version: &str,
        driver: Arc<dyn ProtocolDriver>,
        args: &ServiceArgs,
    ) -> Result<Self> {
        if default_name.is_empty() {
            return Err(Error::NoDeviceName);
        }
        if version.is_empty() {
            return Err(Error::NoDeviceVersion);
        }

        let name = args
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_name.to_string());
        let confdir = PathBuf::from(args.confdir.clone().unwrap_or_else(|| "res".to_string()));

        let log_control = init_logging(&name);

        let inner = Arc::new(ServiceInner {
            name,
            version: version.to_string(),
            profile: args.profile.clone().filter(|p| !p.is_empty()),
            confdir,
            registry_request: args.registry_request(),
            driver,
            config: std::sync::RwLock::new(Arc::new(Config::default())),
            devices: DeviceMap::new(),
            watchers: WatchList::new(),
            pool: WorkerPool::new(POOL_WORKERS),
            sched: Scheduler::new(),
            server: tokio::sync::RwLock::new(None),
            metadata: std::sync::RwLock::new(None),
            data: std::sync::RwLock::new(None),
            registry: std::sync::RwLock::new(None),
            admin_state: std::sync::RwLock::new(AdminState::Unlocked),
            op_state: std::sync::RwLock::new(OperatingState::Enabled),
            stop_config: Arc::new(AtomicBool::new(false)),
            disco_lock: Arc::new(tokio::sync::Mutex::new(())),
            start_time: AtomicU64::new(0),
            state: std::sync::RwLock::new(LifecycleState::New),
            log_control,
            autoevent_last: std::sync::Mutex::new(HashMap::new()),
        });

        Ok(Self { inner })
    }

    /// The service name used for metadata registration and lookups.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    /// Current effective configuration snapshot.
    pub fn config(&self) -> Arc<Config> {
        self.inner.config_snapshot()
    }

    /// Port of the running control surface, once bring-up has opened it.
    pub async fn http_port(&self) -> Option<u16> {
        self.inner.server.read().await.as_ref().map(|s| s.port())
    }

    /// Run bring-up. On failure the service lands in the failed state and
    /// must be dropped, not started again.
    pub async fn start(&self) -> Result<()> {
        self.inner.set_state(LifecycleState::Configuring);
        let result = self.run_start().await;
        if let Err(e) = &result {
            self.inner.set_state(LifecycleState::Failed);
            tracing::error!("Device service start failed: {} [{}]", e, e.code());
        }
        result
    }

    async fn run_start(&self) -> Result<()> {
        let inner = &self.inner;
        inner.start_time.store(time_millis(), Ordering::SeqCst);

        let on_update: ConfigUpdateFn = {
            let weak = Arc::downgrade(inner);
            Arc::new(move |pairs| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_config_update(pairs);
                }
            })
        };

        let resolved = resolver::resolve(ResolveParams {
            name: &inner.name,
            profile: inner.profile.as_deref(),
            confdir: &inner.confdir,
            registry_request: inner.registry_request.clone(),
            stop: inner.stop_config.clone(),
            on_update,
        })
        .await?;

        let ResolvedConfig {
            mut config,
            pairs,
            registry,
            device_list,
        } = resolved;

        if config.device.profiles_dir.is_none() {
            config.device.profiles_dir = Some(inner.confdir.display().to_string());
        }

        // Logging sinks follow the resolved configuration.
        inner.log_control.set_level(&config.logging.level);
        if let Some(file) = &config.logging.file {
            if let Err(e) = inner.log_control.attach_file(file) {
                tracing::warn!("Cannot open log file {}: {}", file, e);
            }
        }
        if config.logging.use_remote {
            ping_endpoint(
                &edgekit_clients::http_client(),
                "support-logging",
                &config.endpoints.logging,
                config.service.connect_retries,
                config.service.retry_delay(),
            )
            .await?;
            inner
                .log_control
                .attach_remote(edgekit_clients::http_client(), &config.endpoints.logging);
        }

        if let Ok(mut slot) = inner.registry.write() {
            *slot = registry;
        }
        inner.set_config(config);

        tracing::info!(
            "Starting {} device service, version {}",
            inner.name,
            inner.version
        );
        tracing::info!("edgekit device SDK version {}", SDK_VERSION);
        tracing::debug!("Service configuration follows:");
        for pair in pairs.iter() {
            tracing::debug!("{}={}", pair.name, pair.value);
        }

        self.start_configured(&device_list).await?;

        let elapsed = time_millis().saturating_sub(inner.start_time.load(Ordering::SeqCst));
        tracing::info!("Service started in: {}ms", elapsed);
        tracing::info!(
            "Listening on port: {}",
            inner.config_snapshot().service.port
        );
        Ok(())
    }

    async fn start_configured(&self, device_list: &[ConfiguredDevice]) -> Result<()> {
        let inner = &self.inner;
        inner.set_state(LifecycleState::BringUp);
        let config = inner.config_snapshot();

        let host = match &config.service.host {
            Some(host) => host.clone(),
            None => node_name(),
        };

        if let Ok(mut admin) = inner.admin_state.write() {
            *admin = AdminState::Unlocked;
        }
        if let Ok(mut op) = inner.op_state.write() {
            *op = OperatingState::Enabled;
        }

        // Wait for data and metadata to be available.
        let probe = edgekit_clients::http_client();
        ping_endpoint(
            &probe,
            "core-data",
            &config.endpoints.data,
            config.service.connect_retries,
            config.service.retry_delay(),
        )
        .await?;
        ping_endpoint(
            &probe,
            "core-metadata",
            &config.endpoints.metadata,
            config.service.connect_retries,
            config.service.retry_delay(),
        )
        .await?;

        let metadata = MetadataClient::new(&config.endpoints.metadata);
        let data = DataClient::new(&config.endpoints.data);
        if let Ok(mut slot) = inner.metadata.write() {
            *slot = Some(metadata.clone());
        }
        if let Ok(mut slot) = inner.data.write() {
            *slot = Some(data);
        }

        self.reconcile_service_record(&metadata, &host, &config).await?;

        inner.set_state(LifecycleState::Loading);

        // Upload profiles before devices are fetched so device records can
        // resolve their profile references.
        self.upload_profiles(&metadata, &config).await?;

        let devices = metadata.devices(&inner.name).await.map_err(|e| {
            tracing::error!("Unable to retrieve device list from metadata");
            e
        })?;
        let count = inner.devices.populate(devices).await;
        tracing::info!("Loaded {} devices from metadata", count);

        // Start the REST server now so metadata-side create callbacks are
        // deliverable while configured devices are processed.
        let server = RestServer::create(config.service.port).await?;
        server
            .register_handler(
                API_CALLBACK,
                &[Method::PUT, Method::POST, Method::DELETE],
                Arc::new(CallbackHandler::new(inner.clone())),
            )
            .await;
        *inner.server.write().await = Some(server);

        self.process_configured_devices(&metadata, device_list).await?;

        // Driver configuration.
        if !inner.driver.initialize(&config.driver).await {
            tracing::error!("Protocol driver initialization failed");
            return Err(Error::DriverUnstart);
        }

        match metadata.watchers(&inner.name).await {
            Ok(watchers) => {
                let added = inner.watchers.populate(watchers).await;
                tracing::info!("Added {} provision watchers from metadata", added);
            }
            Err(e) => {
                tracing::error!("Unable to retrieve provision watchers from metadata: {}", e);
            }
        }

        // Start scheduled events.
        for device in inner.devices.snapshot().await {
            inner.register_autoevents(&device);
        }
        inner.sched.start();

        // Remaining REST handlers.
        {
            let guard = inner.server.read().await;
            let server = guard
                .as_ref()
                .ok_or_else(|| Error::BadConfig("HTTP server lost during bring-up".into()))?;
            server
                .register_handler(
                    API_DEVICE,
                    &[Method::GET, Method::PUT, Method::POST],
                    Arc::new(DeviceHandler::new(inner.clone())),
                )
                .await;
            server
                .register_handler(
                    API_DISCOVERY,
                    &[Method::POST],
                    Arc::new(DiscoveryHandler::new(inner.clone())),
                )
                .await;
            server
                .register_handler(
                    API_METRICS,
                    &[Method::GET],
                    Arc::new(MetricsHandler::new(inner.clone())),
                )
                .await;
            server
                .register_handler(
                    API_CONFIG,
                    &[Method::GET],
                    Arc::new(ConfigHandler::new(inner.clone())),
                )
                .await;
            server
                .register_handler(
                    API_VERSION,
                    &[Method::GET],
                    Arc::new(VersionHandler::new(inner.version.clone())),
                )
                .await;
            server
                .register_handler(
                    API_PING,
                    &[Method::GET],
                    Arc::new(PingHandler::new(inner.version.clone())),
                )
                .await;
        }

        // Ready. Register ourselves and log that we have started.
        if let Some(registry) = inner.registry_client() {
            registry
                .register_service(
                    &inner.name,
                    &host,
                    config.service.port,
                    &config.service.check_interval,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Unable to register service in registry");
                    e
                })?;
        }

        inner.set_state(LifecycleState::Serving);
        if let Some(msg) = &config.service.startup_msg {
            tracing::info!("{}", msg);
        }
        Ok(())
    }

    /// Ensure metadata knows this service, creating or updating its
    /// addressable as needed.
    async fn reconcile_service_record(
        &self,
        metadata: &MetadataClient,
        host: &str,
        config: &Config,
    ) -> Result<()> {
        let inner = &self.inner;
        let record = metadata.device_service(&inner.name).await.map_err(|e| {
            tracing::error!("get_deviceservice failed");
            e
        })?;

        match record {
            Some(mut record) => {
                if record.addressable.port != config.service.port
                    || record.addressable.address != host
                {
                    tracing::info!("Updating service endpoint in metadata");
                    record.addressable.port = config.service.port;
                    record.addressable.address = host.to_string();
                    metadata.update_addressable(&record.addressable).await.map_err(|e| {
                        tracing::error!("update_addressable failed");
                        e
                    })?;
                }
            }
            None => {
                let millis = time_millis();
                let addressable = match metadata.addressable(&inner.name).await.map_err(|e| {
                    tracing::error!("get_addressable failed");
                    e
                })? {
                    Some(addressable) => addressable,
                    None => {
                        let mut addressable = Addressable {
                            id: String::new(),
                            name: inner.name.clone(),
                            protocol: "HTTP".to_string(),
                            method: "POST".to_string(),
                            address: host.to_string(),
                            port: config.service.port,
                            path: API_CALLBACK.to_string(),
                            origin: millis,
                        };
                        addressable.id =
                            metadata.create_addressable(&addressable).await.map_err(|e| {
                                tracing::error!("create_addressable failed");
                                e
                            })?;
                        addressable
                    }
                };

                let mut record = DeviceServiceRecord {
                    id: String::new(),
                    name: inner.name.clone(),
                    labels: config.service.labels.clone(),
                    operating_state: OperatingState::Enabled,
                    admin_state: AdminState::Unlocked,
                    created: millis,
                    addressable,
                };
                record.id = metadata.create_device_service(&record).await.map_err(|e| {
                    tracing::error!("Unable to create device service in metadata");
                    e
                })?;
            }
        }
        Ok(())
    }

    /// Upload profile definition files to metadata when not already known.
    async fn upload_profiles(&self, metadata: &MetadataClient, config: &Config) -> Result<()> {
        let dir = config
            .device
            .profiles_dir
            .clone()
            .unwrap_or_else(|| self.inner.confdir.display().to_string());
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| Error::BadConfig(format!("cannot read profiles directory {dir}: {e}")))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|e| {
                Error::BadConfig(format!("cannot read profile {}: {e}", path.display()))
            })?;
            let profile: DeviceProfile = serde_json::from_str(&text).map_err(|e| {
                Error::BadConfig(format!("cannot parse profile {}: {e}", path.display()))
            })?;
            if metadata.profile_by_name(&profile.name).await?.is_none() {
                metadata.create_profile(&profile).await?;
                tracing::info!("Uploaded device profile {}", profile.name);
            }
        }
        Ok(())
    }

    /// Create devices declared in the configuration file that metadata does
    /// not know yet.
    async fn process_configured_devices(
        &self,
        metadata: &MetadataClient,
        device_list: &[ConfiguredDevice],
    ) -> Result<()> {
        let inner = &self.inner;
        for configured in device_list {
            if inner.devices.get_by_name(&configured.name).await.is_some() {
                continue;
            }
            if metadata.device_by_name(&configured.name).await?.is_some() {
                continue;
            }
            let profile = metadata
                .profile_by_name(&configured.profile)
                .await?
                .ok_or_else(|| {
                    Error::BadConfig(format!(
                        "configured device {} references unknown profile {}",
                        configured.name, configured.profile
                    ))
                })?;

            let mut device = Device {
                id: String::new(),
                name: configured.name.clone(),
                description: configured.description.clone(),
                admin_state: AdminState::Unlocked,
                operating_state: OperatingState::Enabled,
                labels: configured.labels.clone(),
                protocols: configured.protocol_properties(),
                auto_events: configured
                    .auto_events
                    .iter()
                    .map(|e| AutoEvent {
                        resource: e.resource.clone(),
                        frequency: e.frequency.clone(),
                        on_change: e.on_change,
                    })
                    .collect(),
                profile: Arc::new(profile),
            };
            device.id = metadata.create_device(&device).await?;
            let device = inner.devices.insert(device).await;
            tracing::info!("Added configured device {}", device.name);
        }
        Ok(())
    }

    /// Hand driver readings to the posting pipeline.
    ///
    /// Unknown device or resource names are logged and ignored; a resolved
    /// command enqueues exactly one posting work item.
    pub async fn post_readings(&self, device_name: &str, resource: &str, values: &[CommandValue]) {
        let inner = &self.inner;
        let Some(device) = inner.devices.get_by_name(device_name).await else {
            tracing::error!("Post readings: no such device {}", device_name);
            return;
        };
        let profile = device.profile.clone();
        drop(device);

        let Some(command) = profile.command(resource, true) else {
            tracing::error!("Post readings: no such resource {}", resource);
            return;
        };
        inner.submit_event(device_name, command, values);
    }

    /// Stop the service. Errors during shutdown are logged; stop itself
    /// never fails.
    pub async fn stop(&self, force: bool) {
        let inner = &self.inner;
        tracing::debug!("Stop device service");
        inner.set_state(LifecycleState::Stopping);
        inner.stop_config.store(true, Ordering::SeqCst);

        inner.sched.stop();

        let server = inner.server.write().await.take();
        if let Some(server) = server {
            server.stop().await;
        }

        inner.driver.stop(force).await;
        inner.devices.clear().await;

        if let Some(registry) = inner.registry_client() {
            if let Err(e) = registry.deregister_service(&inner.name).await {
                tracing::error!("Unable to deregister service from registry: {}", e);
            }
        }

        inner.pool.drain().await;
        inner.pool.close().await;
        inner.log_control.detach_all();
        tracing::info!("Stopped device service");
        inner.set_state(LifecycleState::Stopped);
    }

    /// Worker-pool statistics, exposed for the metrics handler and tests.
    pub fn pool_stats(&self) -> (u64, usize) {
        (self.inner.pool.submitted(), self.inner.pool.pending())
    }

    /// Whether the autoevent scheduler has been started.
    pub fn scheduler_running(&self) -> bool {
        self.inner.sched.is_running()
    }

    /// Number of devices currently mapped.
    pub async fn device_count(&self) -> usize {
        self.inner.devices.len().await
    }
}

/// The OS node name, used when no host is configured.
fn node_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Install the global subscriber: a compact fmt layer plus the fan-out
/// layer feeding the configured sinks. Later services in the same process
/// reuse the first subscriber.
fn init_logging(service: &str) -> LogControl {
    let (fanout, control) = edgekit_clients::fanout(service);
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        );
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(fanout)
        .try_init();
    control
}
