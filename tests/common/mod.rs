// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed kit and a fluent builder so each
// integration test can lay out its own data tree without repeating
// filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nectl::datatree::{Host, discover_hosts};
use nectl::settings::Settings;

/// Lookup paths used unless a test writes its own settings.
pub const LOOKUP_PATHS: &[&str] = &[
    "common",
    "roles/{role}",
    "sites/{site}/common",
    "sites/{site}/hosts/{hostname}",
];

/// Render the settings file for a kit with `lookup_paths` and extra lines.
pub fn settings_toml(lookup_paths: &[&str], extra: &str) -> String {
    let paths = lookup_paths
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "datatree_lookup_paths = [{paths}]\n\
         hosts_glob_pattern = \"sites/*/hosts/*.toml\"\n\
         hosts_hostname_regex = 'sites/[^/]+/hosts/([^/]+)$'\n\
         hosts_site_regex = 'sites/([^/]+)/hosts/'\n\
         jobs = 2\n\
         {extra}\n"
    )
}

/// An isolated kit backed by a [`tempfile::TempDir`].
///
/// The directory is automatically deleted when dropped.
pub struct TestKit {
    /// Temporary directory holding `nectl.toml` and `data/`.
    pub root: tempfile::TempDir,
}

impl TestKit {
    /// Path of the settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.root.path().join("nectl.toml")
    }

    /// Kit root.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// Load the kit settings.
    pub fn settings(&self) -> Settings {
        Settings::from_file(&self.settings_path()).expect("load settings")
    }

    /// Discover every host in the kit.
    pub fn hosts(&self) -> BTreeMap<String, Arc<Host>> {
        discover_hosts(&self.settings()).expect("discover hosts")
    }

    /// Discover every host in the kit in id order.
    pub fn host_list(&self) -> Vec<Arc<Host>> {
        self.hosts().into_values().collect()
    }
}

/// Fluent builder for [`TestKit`].
pub struct TestKitBuilder {
    lookup_paths: Vec<String>,
    extra_settings: String,
    files: Vec<(String, String)>,
}

impl TestKitBuilder {
    /// Begin an empty kit with the default lookup paths.
    pub fn new() -> Self {
        Self {
            lookup_paths: LOOKUP_PATHS.iter().map(ToString::to_string).collect(),
            extra_settings: String::new(),
            files: Vec::new(),
        }
    }

    /// Replace the lookup paths.
    pub fn lookup_paths(mut self, paths: &[&str]) -> Self {
        self.lookup_paths = paths.iter().map(ToString::to_string).collect();
        self
    }

    /// Append raw lines to the settings file.
    pub fn setting(mut self, line: &str) -> Self {
        self.extra_settings.push_str(line);
        self.extra_settings.push('\n');
        self
    }

    /// Write `content` to `data/<relative>`.
    pub fn data(mut self, relative: &str, content: &str) -> Self {
        self.files.push((relative.to_string(), content.to_string()));
        self
    }

    /// Declare a host source at `data/sites/<site>/hosts/<hostname>.toml`.
    pub fn host(self, site: &str, hostname: &str, content: &str) -> Self {
        self.data(&format!("sites/{site}/hosts/{hostname}.toml"), content)
    }

    /// Write everything to disk and return the kit.
    pub fn build(self) -> TestKit {
        let root = tempfile::tempdir().expect("create temp dir");
        let paths: Vec<&str> = self.lookup_paths.iter().map(String::as_str).collect();
        std::fs::write(
            root.path().join("nectl.toml"),
            settings_toml(&paths, &self.extra_settings),
        )
        .expect("write nectl.toml");
        for (relative, content) in &self.files {
            let path = root.path().join("data").join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("create data dir");
            }
            std::fs::write(&path, content).expect("write data file");
        }
        TestKit { root }
    }
}

/// A junos host source with a management address.
pub fn junos_host(role: &str, mgmt_ip: &str) -> String {
    format!(
        "os_name = \"junos\"\nos_version = \"21.4R3\"\nrole = \"{role}\"\nmgmt_ip = \"{mgmt_ip}\"\n"
    )
}
