//! REST clients for the north-bound platform services.
//!
//! The lifecycle engine drives these clients; they hold no state beyond a
//! `reqwest` connection pool and the base URL of the service they talk to.

pub mod data;
pub mod logging;
pub mod metadata;
pub mod ping;
pub mod registry;

pub use data::DataClient;
pub use logging::{fanout, parse_level, FanoutLayer, LogControl, LogEntry};
pub use metadata::MetadataClient;
pub use ping::ping_endpoint;
pub use registry::RegistryClient;

use std::time::Duration;

/// Default request timeout for north-bound calls.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared client builder so every north-bound client gets the same timeout
/// policy.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}
