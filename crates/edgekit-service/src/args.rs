//! Command-line options shared by every device service binary.

use clap::Parser;

use edgekit_core::{Error, Result};

/// Environment variable naming the default registry URL.
pub const ENV_REGISTRY: &str = "edgex_registry";

/// Standard device service options.
///
/// `--registry` takes an optional value: `-r http://reg:8500` names the
/// registry directly, a bare `-r` means "use the registry, take its location
/// from the environment or the configuration file".
#[derive(Debug, Clone, Default, Parser)]
#[command(disable_version_flag = true)]
pub struct ServiceArgs {
    /// Set the device service name.
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// Use the registry service.
    #[arg(short = 'r', long = "registry", num_args = 0..=1, default_missing_value = "")]
    pub registry: Option<String>,

    /// Set the profile name.
    #[arg(short = 'p', long = "profile")]
    pub profile: Option<String>,

    /// Set the configuration directory.
    #[arg(short = 'c', long = "confdir")]
    pub confdir: Option<String>,
}

impl ServiceArgs {
    /// Parse from an explicit argument list. Mismatched flag values map to
    /// `INVALID_ARG`.
    pub fn try_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| Error::InvalidArg(e.to_string()))
    }

    /// The requested registry location, folding in the environment.
    ///
    /// `Some(url)` is an explicit location, `Some("")` means "registry
    /// requested, discover the URL from the configuration file", `None`
    /// disables the registry.
    pub fn registry_request(&self) -> Option<String> {
        let from_env = || std::env::var(ENV_REGISTRY).ok().filter(|v| !v.is_empty());
        match &self.registry {
            Some(url) if !url.is_empty() => Some(url.clone()),
            Some(_) => from_env().or_else(|| Some(String::new())),
            None => from_env(),
        }
    }
}
