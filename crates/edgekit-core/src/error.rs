//! Unified error handling for edgekit.
//!
//! Every fallible operation in the SDK reports one of these variants. Each
//! variant maps to a stable code string so callers (and the control surface)
//! can branch on the class of failure without parsing the reason text.

/// Unified error type for the SDK.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No driver implementation was supplied to the constructor.
    #[error("no protocol driver implementation supplied")]
    NoDeviceImpl,

    /// No service name was supplied to the constructor.
    #[error("no device service name specified")]
    NoDeviceName,

    /// No version string was supplied to the constructor.
    #[error("no device service version specified")]
    NoDeviceVersion,

    /// Command-line parse failure, or the registry was requested but no
    /// location could be resolved.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A required configuration element (endpoint host or port) is missing
    /// or unusable.
    #[error("bad configuration: {0}")]
    BadConfig(String),

    /// A required external service failed all ping retries.
    #[error("remote server down: {0}")]
    RemoteServerDown(String),

    /// The protocol driver refused to initialize.
    #[error("protocol driver initialization failed")]
    DriverUnstart,

    /// A metadata operation failed; the reason is prefixed with the
    /// operation that failed.
    #[error("{operation}: {reason}")]
    Metadata {
        operation: &'static str,
        reason: String,
    },

    /// The data service rejected or failed an event post.
    #[error("data service: {0}")]
    Data(String),

    /// A registry operation failed.
    #[error("registry: {0}")]
    Registry(String),

    /// Transport-level HTTP failure talking to a north-bound service.
    #[error("http: {0}")]
    Http(String),
}

impl Error {
    /// Stable code string for this class of error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoDeviceImpl => "NO_DEVICE_IMPL",
            Error::NoDeviceName => "NO_DEVICE_NAME",
            Error::NoDeviceVersion => "NO_DEVICE_VERSION",
            Error::InvalidArg(_) => "INVALID_ARG",
            Error::BadConfig(_) => "BAD_CONFIG",
            Error::RemoteServerDown(_) => "REMOTE_SERVER_DOWN",
            Error::DriverUnstart => "DRIVER_UNSTART",
            Error::Metadata { .. } => "METADATA_ERROR",
            Error::Data(_) => "DATA_ERROR",
            Error::Registry(_) => "REGISTRY_ERROR",
            Error::Http(_) => "HTTP_ERROR",
        }
    }

    /// Attach a metadata operation name to a transport failure.
    pub fn in_operation(self, operation: &'static str) -> Self {
        match self {
            Error::Metadata { reason, .. } => Error::Metadata { operation, reason },
            other => Error::Metadata {
                operation,
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;
