//! Driver selection by OS name.
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::driver::{Driver, NetworkDriver};
use super::eapi::EapiBackend;
use super::error::DriverError;
use super::netconf::NetconfBackend;
use crate::settings::{DEFAULT_COMMIT_COMMENT, Settings};

/// Builds a driver for one host.
pub type DriverFactory = Arc<dyn Fn(&DriverTarget) -> Box<dyn Driver> + Send + Sync>;

/// Name of the built-in NETCONF driver.
pub const NETCONF: &str = "netconf";

/// Name of the built-in eAPI driver.
pub const EAPI: &str = "eapi";

/// Everything a driver needs to reach one host.
#[derive(Clone)]
pub struct DriverTarget {
    /// Host id, used to prefix log lines.
    pub host_id: String,
    /// OS name of the host.
    pub os_name: String,
    /// Management address.
    pub address: IpAddr,
    /// Login username.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// SSH private key file.
    pub ssh_key: Option<PathBuf>,
    /// Timeout for establishing the session.
    pub connect_timeout: Duration,
    /// Timeout for a single RPC.
    pub rpc_timeout: Duration,
    /// Comment recorded with commits.
    pub commit_comment: String,
    /// Verify TLS certificates on HTTPS transports.
    pub tls_verify: bool,
}

impl fmt::Debug for DriverTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverTarget")
            .field("host_id", &self.host_id)
            .field("os_name", &self.os_name)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssh_key", &self.ssh_key)
            .finish_non_exhaustive()
    }
}

impl DriverTarget {
    /// Target with default timeouts and no credentials.
    #[must_use]
    pub fn new(host_id: impl Into<String>, os_name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            host_id: host_id.into(),
            os_name: os_name.into(),
            address,
            username: None,
            password: None,
            ssh_key: None,
            connect_timeout: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(30),
            commit_comment: DEFAULT_COMMIT_COMMENT.to_string(),
            tls_verify: false,
        }
    }

    /// Apply timeouts, commit comment and TLS policy from kit settings.
    #[must_use]
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.connect_timeout = Duration::from_secs(settings.connect_timeout_secs);
        self.rpc_timeout = Duration::from_secs(settings.rpc_timeout_secs);
        self.commit_comment.clone_from(&settings.commit_comment);
        self.tls_verify = settings.tls_verify;
        self
    }
}

/// Maps hosts to driver implementations.
///
/// Lookup order: overrides by OS name, built-in drivers by OS name, then the
/// configured default driver by driver name.
#[derive(Clone)]
pub struct DriverRegistry {
    overrides: BTreeMap<String, DriverFactory>,
    named: BTreeMap<String, DriverFactory>,
    builtin_os: BTreeMap<String, String>,
    default_driver: Option<String>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .field("builtin_os", &self.builtin_os)
            .field("default_driver", &self.default_driver)
            .finish()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DriverRegistry {
    /// Registry with the built-in drivers and an optional default driver name.
    #[must_use]
    pub fn new(default_driver: Option<String>) -> Self {
        let netconf: DriverFactory = Arc::new(|target: &DriverTarget| {
            Box::new(NetworkDriver::new(target, NetconfBackend::new(target))) as Box<dyn Driver>
        });
        let eapi: DriverFactory = Arc::new(|target: &DriverTarget| {
            Box::new(NetworkDriver::new(target, EapiBackend::new(target))) as Box<dyn Driver>
        });
        Self {
            overrides: BTreeMap::new(),
            named: BTreeMap::from([(NETCONF.to_string(), netconf), (EAPI.to_string(), eapi)]),
            builtin_os: BTreeMap::from([
                ("junos".to_string(), NETCONF.to_string()),
                ("eos".to_string(), EAPI.to_string()),
            ]),
            default_driver,
        }
    }

    /// Use `factory` for every host with this OS name, ahead of built-ins.
    #[must_use]
    pub fn with_override<F>(mut self, os_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&DriverTarget) -> Box<dyn Driver> + Send + Sync + 'static,
    {
        self.overrides.insert(os_name.into(), Arc::new(factory));
        self
    }

    /// Register a driver under a name usable as the default driver.
    #[must_use]
    pub fn with_named<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&DriverTarget) -> Box<dyn Driver> + Send + Sync + 'static,
    {
        self.named.insert(name.into(), Arc::new(factory));
        self
    }

    /// Replace the default driver name.
    #[must_use]
    pub fn with_default_driver(mut self, name: Option<String>) -> Self {
        self.default_driver = name;
        self
    }

    /// Find the factory for `os_name`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotFound`] if nothing matches, or if the
    /// configured default names an unknown driver.
    pub fn resolve(&self, os_name: &str) -> Result<DriverFactory, DriverError> {
        if let Some(factory) = self.overrides.get(os_name) {
            return Ok(Arc::clone(factory));
        }
        if let Some(factory) = self
            .builtin_os
            .get(os_name)
            .and_then(|name| self.named.get(name))
        {
            return Ok(Arc::clone(factory));
        }
        match &self.default_driver {
            Some(name) => self.named.get(name).map(Arc::clone).ok_or_else(|| {
                DriverError::NotFound(format!("no default driver found matching name: {name}"))
            }),
            None => Err(DriverError::NotFound(format!(
                "no driver found that matches os_name: {os_name}"
            ))),
        }
    }

    /// Construct a driver for `target`.
    ///
    /// # Errors
    ///
    /// As for [`Self::resolve`].
    pub fn create(&self, target: &DriverTarget) -> Result<Box<dyn Driver>, DriverError> {
        let factory = self.resolve(&target.os_name)?;
        Ok(factory(target))
    }
}
