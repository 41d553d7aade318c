use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use super::facts::Facts;
use super::resolve::FactResolver;
use crate::error::{DiscoveryError, FactsError};
use crate::logging::Log;

/// Attributes a host source may declare about itself.
pub(super) const CORE_ATTRIBUTES: &[&str] = &[
    "role",
    "deployment_group",
    "manufacturer",
    "model",
    "os_name",
    "os_version",
    "serial_number",
    "asset_tag",
    "mgmt_ip",
    "username",
    "password",
];

/// A network device discovered in the data tree.
///
/// Identity (`hostname`, `site`, `customer`) comes from the host source's
/// location; the remaining attributes from the host source itself. Facts are
/// resolved on first access and cached for the host's lifetime.
#[derive(Clone, Default)]
pub struct Host {
    /// Host name.
    pub hostname: String,
    /// Site the host belongs to.
    pub site: Option<String>,
    /// Customer the host belongs to.
    pub customer: Option<String>,
    /// Role of the host (e.g. `core`, `edge`).
    pub role: Option<String>,
    /// Deployment group used to stage rollouts.
    pub deployment_group: Option<String>,
    /// Hardware manufacturer.
    pub manufacturer: Option<String>,
    /// Hardware model.
    pub model: Option<String>,
    /// Operating system name, selects template and driver.
    pub os_name: Option<String>,
    /// Operating system version.
    pub os_version: Option<String>,
    /// Serial number.
    pub serial_number: Option<String>,
    /// Asset tag.
    pub asset_tag: Option<String>,
    /// Management address used by drivers.
    pub mgmt_ip: Option<IpAddr>,
    /// Login username.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    facts: OnceLock<Arc<Facts>>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id())
            .field("role", &self.role)
            .field("os_name", &self.os_name)
            .field("mgmt_ip", &self.mgmt_ip)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("facts_resolved", &self.facts.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Host {
    /// Create a host with only a hostname.
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Set the site.
    #[must_use]
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    /// Set the customer.
    #[must_use]
    pub fn with_customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }

    /// Set the role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set OS name and version.
    #[must_use]
    pub fn with_os(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.os_name = Some(name.into());
        self.os_version = Some(version.into());
        self
    }

    /// Set the management address.
    #[must_use]
    pub const fn with_mgmt_ip(mut self, ip: IpAddr) -> Self {
        self.mgmt_ip = Some(ip);
        self
    }

    /// Unique id: the present parts of `hostname.site.customer`.
    #[must_use]
    pub fn id(&self) -> String {
        [
            Some(self.hostname.as_str()),
            self.site.as_deref(),
            self.customer.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(".")
    }

    /// Set a core attribute from a host source value.
    ///
    /// Returns `Ok(false)` if `name` is not a core attribute.
    pub(super) fn set_core_attribute(
        &mut self,
        name: &str,
        value: String,
    ) -> Result<bool, DiscoveryError> {
        let slot = match name {
            "role" => &mut self.role,
            "deployment_group" => &mut self.deployment_group,
            "manufacturer" => &mut self.manufacturer,
            "model" => &mut self.model,
            "os_name" => &mut self.os_name,
            "os_version" => &mut self.os_version,
            "serial_number" => &mut self.serial_number,
            "asset_tag" => &mut self.asset_tag,
            "username" => &mut self.username,
            "password" => &mut self.password,
            "mgmt_ip" => {
                let ip = value
                    .parse::<IpAddr>()
                    .map_err(|_| DiscoveryError::InvalidAddress {
                        host: self.id(),
                        value: value.clone(),
                    })?;
                self.mgmt_ip = Some(ip);
                return Ok(true);
            }
            _ => return Ok(false),
        };
        *slot = Some(value);
        Ok(true)
    }

    /// Core attribute as declared by the host source, without fact fallback.
    fn core_attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id()),
            "hostname" => Some(self.hostname.clone()),
            "site" => self.site.clone(),
            "customer" => self.customer.clone(),
            "role" => self.role.clone(),
            "deployment_group" => self.deployment_group.clone(),
            "manufacturer" => self.manufacturer.clone(),
            "model" => self.model.clone(),
            "os_name" => self.os_name.clone(),
            "os_version" => self.os_version.clone(),
            "serial_number" => self.serial_number.clone(),
            "asset_tag" => self.asset_tag.clone(),
            "mgmt_ip" => self.mgmt_ip.map(|ip| ip.to_string()),
            "username" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }

    /// Identity values usable as lookup path placeholders.
    #[must_use]
    pub fn placeholder_values(&self) -> BTreeMap<String, String> {
        ["id", "hostname", "site", "customer"]
            .into_iter()
            .chain(CORE_ATTRIBUTES.iter().copied())
            .filter(|name| !matches!(*name, "username" | "password"))
            .filter_map(|name| Some((name.to_string(), self.core_attribute(name)?)))
            .collect()
    }

    /// Facts every resolution starts from, with whether each is frozen.
    ///
    /// Identity is frozen so the data tree cannot rename a host; the other
    /// declared attributes may be overridden.
    pub(super) fn seed_facts(&self) -> Vec<(String, Value, bool)> {
        let identity = ["id", "hostname", "site", "customer"]
            .into_iter()
            .filter_map(|name| Some((name, self.core_attribute(name)?, true)));
        let attributes = CORE_ATTRIBUTES
            .iter()
            .copied()
            .filter(|name| !matches!(*name, "username" | "password"))
            .filter_map(|name| Some((name, self.core_attribute(name)?, false)));
        identity
            .chain(attributes)
            .map(|(name, value, frozen)| (name.to_string(), Value::String(value), frozen))
            .collect()
    }

    /// Resolve (once) and return the host's facts.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup path cannot be expanded for this host or
    /// a fact source is malformed.
    pub fn facts(&self, resolver: &FactResolver, log: &dyn Log) -> Result<Arc<Facts>, FactsError> {
        if let Some(facts) = self.facts.get() {
            return Ok(Arc::clone(facts));
        }
        let resolved = Arc::new(resolver.resolve(self, log)?);
        Ok(Arc::clone(self.facts.get_or_init(|| resolved)))
    }

    /// Facts already resolved by [`Self::facts`], if any.
    #[must_use]
    pub fn resolved_facts(&self) -> Option<Arc<Facts>> {
        self.facts.get().map(Arc::clone)
    }

    /// Attribute value, falling back to resolved facts.
    ///
    /// `site`, `customer`, `role` and `mgmt_ip` only ever come from the host
    /// source. Every other attribute falls back to the fact of the same name
    /// once facts have been resolved.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<String> {
        if let Some(value) = self.core_attribute(name) {
            return Some(value);
        }
        if matches!(name, "site" | "customer" | "role" | "mgmt_ip") {
            return None;
        }
        let facts = self.facts.get()?;
        match facts.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}
