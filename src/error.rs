//! Domain-specific error types for nectl.
//!
//! Internal modules return typed errors (e.g., [`FactsError`], [`RenderError`])
//! while command handlers at the CLI boundary convert them to [`anyhow::Error`]
//! via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! NectlError
//! ├── Settings(SettingsError)   — kit settings file and values
//! ├── Discovery(DiscoveryError) — host identity extraction
//! ├── Facts(FactsError)         — lookup paths and fact sources
//! ├── Render(RenderError)       — template selection and section failures
//! ├── Driver(DriverError)       — device protocol failures
//! └── WorkerPool                — thread pool construction
//! ```
//!
//! Discovery and fact errors abort a whole run. Render and driver errors are
//! isolated to the host they happened on and tallied by the callers.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::drivers::DriverError;
use crate::templates::SectionError;

/// Top-level error type for nectl.
#[derive(Error, Debug)]
pub enum NectlError {
    /// Kit settings could not be loaded.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Host discovery failed.
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Fact resolution failed.
    #[error("Facts error: {0}")]
    Facts(#[from] FactsError),

    /// Rendering failed.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// A driver operation failed.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// The worker pool could not be built.
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors that arise while loading kit settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// No settings file exists at the resolved path.
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),

    /// The settings file extension is neither `.toml` nor `.json`.
    #[error("unsupported settings format: {0}")]
    UnsupportedFormat(PathBuf),

    /// The settings file could not be parsed.
    #[error("invalid settings in {path}: {message}")]
    Parse {
        /// Path to the settings file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A configured regular expression does not compile.
    #[error("invalid regex in '{field}': {source}")]
    InvalidRegex {
        /// Settings key holding the regex.
        field: &'static str,
        /// Underlying regex error.
        source: regex::Error,
    },

    /// A settings value is out of range or malformed.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue {
        /// Settings key holding the value.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// An I/O error occurred while reading the settings file.
    #[error("IO error reading settings file {path}: {source}")]
    Io {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors that arise while discovering hosts in the data tree.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The hosts glob pattern is malformed.
    #[error("invalid hosts glob pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Glob parser message.
        message: String,
    },

    /// A host source path did not match one of the identity regexes.
    #[error("{field} regex did not match host path '{path}'")]
    NoMatch {
        /// Identity field being extracted (`hostname`, `site`, `customer`).
        field: &'static str,
        /// Path relative to the data tree.
        path: String,
    },

    /// A host declares a management address that is not an IP address.
    #[error("host '{host}' has invalid mgmt_ip: {value}")]
    InvalidAddress {
        /// Host id.
        host: String,
        /// Declared value.
        value: String,
    },

    /// A host source could not be read or parsed.
    #[error("failed to read host source {path}: {message}")]
    Source {
        /// Path to the host source.
        path: PathBuf,
        /// Underlying error message.
        message: String,
    },
}

/// Errors that arise while resolving facts for a host.
#[derive(Error, Debug)]
pub enum FactsError {
    /// A lookup path references an identity field the host does not have.
    #[error("[{host}] lookup path '{path}' needs '{placeholder}' which the host does not define")]
    UnresolvedPlaceholder {
        /// Host id.
        host: String,
        /// Placeholder name without braces.
        placeholder: String,
        /// Lookup path template.
        path: String,
    },

    /// A fact source is not a valid document.
    #[error("malformed fact source {path}: {message}")]
    MalformedSource {
        /// Path to the fact source.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A fact source could not be read.
    #[error("IO error reading fact source {path}: {source}")]
    Io {
        /// Path to the fact source.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors that arise while rendering a host's configuration.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No template is registered for the host's OS.
    #[error("template not found for os_name '{os_name}'")]
    TemplateMissing {
        /// OS name of the host.
        os_name: String,
    },

    /// The template loader refused to build a template.
    #[error("template for os_name '{os_name}' failed to load: {reason}")]
    TemplateImport {
        /// OS name of the host.
        os_name: String,
        /// Loader message.
        reason: String,
    },

    /// One or more sections failed so the host config was discarded.
    #[error(
        "render aborted due to {} render errors with host: {host} ({})",
        .failures.len(),
        summarize(.failures)
    )]
    SectionsFailed {
        /// Host id.
        host: String,
        /// Every failed section, in declared order.
        failures: Vec<SectionFailure>,
    },

    /// Rendered output could not be persisted.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// A section that produced no output, by name.
#[derive(Debug)]
pub struct SectionFailure {
    /// Section name.
    pub section: String,
    /// Why the section failed.
    pub error: SectionError,
}

fn summarize(failures: &[SectionFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("section '{}' {}", f.section, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RenderError {
    /// Names of the required facts whose absence failed a section.
    #[must_use]
    pub fn missing_facts(&self) -> Vec<&str> {
        match self {
            Self::SectionsFailed { failures, .. } => failures
                .iter()
                .filter_map(|f| match &f.error {
                    SectionError::MissingFact(name) => Some(name.as_str()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}
