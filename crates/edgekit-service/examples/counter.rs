//! Pseudo-device service emulating counters.
//!
//! Each device addresses one of 256 counters through the `Counter` protocol
//! (`Index` property). Reading the `count` resource returns and increments
//! the counter; writing it stores a new value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use edgekit_core::{CommandValue, Device, DeviceResource, Error, NvPairs, Result};
use edgekit_service::{DeviceService, ProtocolDriver, ServiceArgs};

const NCOUNTERS: usize = 256;

struct CounterDriver {
    counters: Vec<AtomicU64>,
}

impl CounterDriver {
    fn new() -> Self {
        Self {
            counters: (0..NCOUNTERS).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn index_for(&self, device: &Device) -> Result<usize> {
        let properties = device
            .protocols
            .properties("Counter")
            .ok_or_else(|| Error::BadConfig("no Counter protocol in device address".into()))?;
        let index = properties
            .uint_value("Index")
            .ok_or_else(|| Error::BadConfig("no Index property in Counter protocol".into()))?;
        if index as usize >= NCOUNTERS {
            return Err(Error::BadConfig(format!("invalid Index: {index}")));
        }
        Ok(index as usize)
    }
}

#[async_trait]
impl ProtocolDriver for CounterDriver {
    async fn initialize(&self, config: &NvPairs) -> bool {
        for counter in &self.counters {
            counter.store(0, Ordering::SeqCst);
        }
        if let Some(start) = config.uint_value("Start") {
            for counter in &self.counters {
                counter.store(start, Ordering::SeqCst);
            }
        }
        true
    }

    async fn handle_get(
        &self,
        device: &Device,
        resource: &DeviceResource,
    ) -> Result<Vec<CommandValue>> {
        let index = self.index_for(device)?;
        match resource.name.as_str() {
            "count" => {
                let value = self.counters[index].fetch_add(1, Ordering::SeqCst);
                Ok(vec![CommandValue::Integer(value as i64)])
            }
            other => Err(Error::BadConfig(format!(
                "request for nonexistent register {other}"
            ))),
        }
    }

    async fn handle_put(
        &self,
        device: &Device,
        resource: &DeviceResource,
        values: &[CommandValue],
    ) -> Result<()> {
        let index = self.index_for(device)?;
        match (resource.name.as_str(), values.first()) {
            ("count", Some(CommandValue::Integer(value))) => {
                self.counters[index].store(*value as u64, Ordering::SeqCst);
                Ok(())
            }
            ("count", _) => Err(Error::BadConfig("count takes one integer value".into())),
            (other, _) => Err(Error::BadConfig(format!(
                "request for nonexistent register {other}"
            ))),
        }
    }

    async fn stop(&self, _force: bool) {}
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = match ServiceArgs::try_from_args(std::env::args()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let driver = Arc::new(CounterDriver::new());
    let service = match DeviceService::new("device-counter", "1.0", driver, &args) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error: {}: {e}", e.code());
            return std::process::ExitCode::FAILURE;
        }
    };

    if let Err(e) = service.start().await {
        eprintln!("Error: {}: {e}", e.code());
        return std::process::ExitCode::FAILURE;
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        service.stop(true).await;
    }
    std::process::ExitCode::SUCCESS
}
