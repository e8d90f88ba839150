//! Device service lifecycle engine.
//!
//! This crate hosts the runtime of a device service: the concurrent device
//! map, the worker pool and autoevent scheduler, the configuration
//! resolver, the HTTP control surface and the bring-up/shutdown state
//! machine that ties them to the north-bound clients.

pub mod args;
pub mod callback;
pub mod devmap;
pub mod driver;
pub mod handlers;
pub mod http;
pub mod pool;
pub mod resolver;
pub mod sched;
pub mod service;
pub mod watchlist;

pub use args::ServiceArgs;
pub use devmap::DeviceMap;
pub use driver::ProtocolDriver;
pub use pool::WorkerPool;
pub use sched::Scheduler;
pub use service::{DeviceService, LifecycleState, SDK_VERSION};
pub use watchlist::WatchList;
