//! Host discovery: find host sources in the data tree and extract identity.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use super::host::{CORE_ATTRIBUTES, Host};
use super::source::parse_table;
use crate::error::DiscoveryError;
use crate::settings::Settings;

/// Discover every host matching the kit's hosts glob, keyed by host id.
///
/// Paths with a component starting with `.` or `_` are ignored.
///
/// # Errors
///
/// Returns an error if the glob is invalid, an identity regex does not match
/// a host path, or a host source cannot be read.
pub fn discover_hosts(settings: &Settings) -> Result<BTreeMap<String, Arc<Host>>, DiscoveryError> {
    let datatree = settings.datatree_path();
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&datatree.to_string_lossy()),
        settings.hosts_glob_pattern
    );
    let paths = glob::glob(&pattern).map_err(|e| DiscoveryError::InvalidPattern {
        pattern: settings.hosts_glob_pattern.clone(),
        message: e.to_string(),
    })?;

    let mut hosts = BTreeMap::new();
    for entry in paths {
        let path = entry.map_err(|e| DiscoveryError::Source {
            path: e.path().to_path_buf(),
            message: e.error().to_string(),
        })?;
        let Some(relative) = relative_path(&datatree, &path) else {
            continue;
        };
        if !path.is_file() || is_ignored(&relative) {
            continue;
        }
        let host = host_from_source(settings, &path, &relative)?;
        hosts.insert(host.id(), Arc::new(host));
    }
    Ok(hosts)
}

/// Path relative to the data tree with `/` separators.
fn relative_path(datatree: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(datatree).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

fn is_ignored(relative: &str) -> bool {
    relative
        .split('/')
        .any(|part| part.starts_with('.') || part.starts_with('_'))
}

fn capture(re: &Regex, field: &'static str, relative: &str) -> Result<String, DiscoveryError> {
    re.captures(relative)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| DiscoveryError::NoMatch {
            field,
            path: relative.to_string(),
        })
}

fn strip_source_extension(name: &str) -> &str {
    name.strip_suffix(".toml")
        .or_else(|| name.strip_suffix(".json"))
        .unwrap_or(name)
}

fn host_from_source(
    settings: &Settings,
    path: &Path,
    relative: &str,
) -> Result<Host, DiscoveryError> {
    let hostname = capture(&settings.hosts_hostname_regex, "hostname", relative)?;
    let mut host = Host::new(strip_source_extension(&hostname));
    if let Some(re) = &settings.hosts_site_regex {
        host.site = Some(capture(re, "site", relative)?);
    }
    if let Some(re) = &settings.hosts_customer_regex {
        host.customer = Some(capture(re, "customer", relative)?);
    }

    let source_err = |message: String| DiscoveryError::Source {
        path: path.to_path_buf(),
        message,
    };
    let content = fs::read_to_string(path).map_err(|e| source_err(e.to_string()))?;
    let table = parse_table(path, &content).map_err(source_err)?;
    for name in CORE_ATTRIBUTES {
        let value = match table.get(*name) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(_) => return Err(source_err(format!("'{name}' must be a scalar value"))),
        };
        host.set_core_attribute(name, value)?;
    }
    Ok(host)
}

/// Selects hosts by identity attributes; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    /// Match this hostname.
    pub hostname: Option<String>,
    /// Match this customer.
    pub customer: Option<String>,
    /// Match this site.
    pub site: Option<String>,
    /// Match this role.
    pub role: Option<String>,
    /// Match this deployment group.
    pub deployment_group: Option<String>,
}

impl HostFilter {
    /// Returns `true` if `host` satisfies every set field.
    #[must_use]
    pub fn matches(&self, host: &Host) -> bool {
        fn field_matches(want: Option<&String>, have: Option<&String>) -> bool {
            want.is_none_or(|w| have == Some(w))
        }
        field_matches(self.hostname.as_ref(), Some(&host.hostname))
            && field_matches(self.customer.as_ref(), host.customer.as_ref())
            && field_matches(self.site.as_ref(), host.site.as_ref())
            && field_matches(self.role.as_ref(), host.role.as_ref())
            && field_matches(
                self.deployment_group.as_ref(),
                host.deployment_group.as_ref(),
            )
    }

    /// Filter discovered hosts, preserving id order.
    #[must_use]
    pub fn apply(&self, hosts: &BTreeMap<String, Arc<Host>>) -> Vec<Arc<Host>> {
        hosts
            .values()
            .filter(|h| self.matches(h))
            .map(Arc::clone)
            .collect()
    }
}
