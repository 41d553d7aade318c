//! Kit settings: where the data tree lives, how hosts are discovered and how
//! configs are staged and deployed.
//!
//! Settings are read from a TOML or JSON file. The file's directory becomes
//! the kit root that every relative path is resolved against.
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::datatree::Action;
use crate::drivers::ConfigFormat;
use crate::error::SettingsError;

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "NECTL_SETTINGS";

/// Environment variable overriding the commit comment.
pub const COMMIT_COMMENT_ENV: &str = "NECTL_COMMIT_COMMENT";

/// Settings file used when neither `--settings` nor [`SETTINGS_ENV`] is set.
pub const DEFAULT_SETTINGS_FILE: &str = "nectl.toml";

/// Commit comment used unless configured or overridden.
pub const DEFAULT_COMMIT_COMMENT: &str = "Configured by Nectl.";

/// On-disk shape of the settings file.
#[derive(Debug, Deserialize)]
struct RawSettings {
    datatree_lookup_paths: Vec<String>,
    hosts_glob_pattern: String,
    hosts_hostname_regex: String,
    #[serde(default)]
    hosts_site_regex: Option<String>,
    #[serde(default)]
    hosts_customer_regex: Option<String>,
    #[serde(default = "default_datatree_dirname")]
    datatree_dirname: String,
    #[serde(default)]
    default_action: Action,
    #[serde(default)]
    default_driver: Option<String>,
    #[serde(default = "default_staged_configs_dir")]
    staged_configs_dir: String,
    #[serde(default = "default_config_diffs_dir")]
    config_diffs_dir: String,
    #[serde(default = "default_active_configs_dir")]
    active_configs_dir: String,
    #[serde(default = "default_configs_file_extension")]
    configs_file_extension: String,
    #[serde(default)]
    configs_format: Option<ConfigFormat>,
    #[serde(default = "default_true")]
    configs_sanitized: bool,
    #[serde(default = "default_rollback_minutes")]
    commit_rollback_minutes: u32,
    #[serde(default)]
    commit_comment: Option<String>,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_secs: u64,
    #[serde(default = "default_rpc_timeout")]
    rpc_timeout_secs: u64,
    #[serde(default)]
    tls_verify: bool,
    #[serde(default)]
    jobs: Option<usize>,
}

fn default_datatree_dirname() -> String {
    "data".to_string()
}

fn default_staged_configs_dir() -> String {
    "configs/staged".to_string()
}

fn default_config_diffs_dir() -> String {
    "configs/diffs".to_string()
}

fn default_active_configs_dir() -> String {
    "configs/active".to_string()
}

fn default_configs_file_extension() -> String {
    "txt".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_rollback_minutes() -> u32 {
    1
}

const fn default_connect_timeout() -> u64 {
    5
}

const fn default_rpc_timeout() -> u64 {
    30
}

/// Validated kit settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path of the settings file that was loaded.
    pub settings_path: PathBuf,
    /// Kit root directory (the settings file's parent).
    pub kit_path: PathBuf,
    /// Lookup path templates, general to specific.
    pub datatree_lookup_paths: Vec<String>,
    /// Glob, relative to the data tree, matching host sources.
    pub hosts_glob_pattern: String,
    /// Capture group 1 yields the hostname.
    pub hosts_hostname_regex: Regex,
    /// Capture group 1 yields the site.
    pub hosts_site_regex: Option<Regex>,
    /// Capture group 1 yields the customer.
    pub hosts_customer_regex: Option<Regex>,
    /// Name of the data tree directory under the kit root.
    pub datatree_dirname: String,
    /// Action applied to declarations without an explicit one.
    pub default_action: Action,
    /// Driver used when no built-in driver matches a host's OS.
    pub default_driver: Option<String>,
    /// Staged configs directory, relative to the kit root.
    pub staged_configs_dir: String,
    /// Diff output directory, relative to the kit root.
    pub config_diffs_dir: String,
    /// Active (backup) configs directory, relative to the kit root.
    pub active_configs_dir: String,
    /// Extension of staged and active config files.
    pub configs_file_extension: String,
    /// Config format used for load and retrieval; `None` uses the backend default.
    pub configs_format: Option<ConfigFormat>,
    /// Strip secrets from retrieved configs.
    pub configs_sanitized: bool,
    /// Automatic rollback timer for committed changes, in minutes.
    pub commit_rollback_minutes: u32,
    /// Comment attached to commits.
    pub commit_comment: String,
    /// Device connection timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Per-request timeout once connected, in seconds.
    pub rpc_timeout_secs: u64,
    /// Verify device TLS certificates on HTTP based drivers.
    pub tls_verify: bool,
    /// Number of hosts processed concurrently.
    pub jobs: usize,
}

impl Settings {
    /// Load settings from `explicit`, else `$NECTL_SETTINGS`, else `./nectl.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        let path = resolve_settings_path(explicit, std::env::var(SETTINGS_ENV).ok());
        let mut settings = Self::from_file(&path)?;
        if let Ok(comment) = std::env::var(COMMIT_COMMENT_ENV)
            && !comment.is_empty()
        {
            settings.commit_comment = comment;
        }
        Ok(settings)
    }

    /// Load settings from a specific file without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or invalid.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        if !path.is_file() {
            return Err(SettingsError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = parse_raw(path, &content)?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let kit_path = dunce::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
        Self::from_raw(raw, path.to_path_buf(), kit_path)
    }

    fn from_raw(
        raw: RawSettings,
        settings_path: PathBuf,
        kit_path: PathBuf,
    ) -> Result<Self, SettingsError> {
        let jobs = match raw.jobs {
            Some(0) => {
                return Err(SettingsError::InvalidValue {
                    field: "jobs",
                    message: "must be at least 1".to_string(),
                });
            }
            Some(n) => n,
            None => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        };
        if raw.configs_file_extension.is_empty() {
            return Err(SettingsError::InvalidValue {
                field: "configs_file_extension",
                message: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            settings_path,
            kit_path,
            datatree_lookup_paths: raw.datatree_lookup_paths,
            hosts_glob_pattern: raw.hosts_glob_pattern,
            hosts_hostname_regex: compile("hosts_hostname_regex", &raw.hosts_hostname_regex)?,
            hosts_site_regex: raw
                .hosts_site_regex
                .as_deref()
                .map(|r| compile("hosts_site_regex", r))
                .transpose()?,
            hosts_customer_regex: raw
                .hosts_customer_regex
                .as_deref()
                .map(|r| compile("hosts_customer_regex", r))
                .transpose()?,
            datatree_dirname: raw.datatree_dirname,
            default_action: raw.default_action,
            default_driver: raw.default_driver,
            staged_configs_dir: raw.staged_configs_dir,
            config_diffs_dir: raw.config_diffs_dir,
            active_configs_dir: raw.active_configs_dir,
            configs_file_extension: raw.configs_file_extension,
            configs_format: raw.configs_format,
            configs_sanitized: raw.configs_sanitized,
            commit_rollback_minutes: raw.commit_rollback_minutes,
            commit_comment: raw
                .commit_comment
                .unwrap_or_else(|| DEFAULT_COMMIT_COMMENT.to_string()),
            connect_timeout_secs: raw.connect_timeout_secs,
            rpc_timeout_secs: raw.rpc_timeout_secs,
            tls_verify: raw.tls_verify,
            jobs,
        })
    }

    /// Absolute path of the data tree.
    #[must_use]
    pub fn datatree_path(&self) -> PathBuf {
        self.kit_path.join(&self.datatree_dirname)
    }

    /// Absolute path of the staged configs directory.
    #[must_use]
    pub fn staged_configs_path(&self) -> PathBuf {
        self.kit_path.join(&self.staged_configs_dir)
    }

    /// Absolute path of the diff output directory.
    #[must_use]
    pub fn config_diffs_path(&self) -> PathBuf {
        self.kit_path.join(&self.config_diffs_dir)
    }

    /// Absolute path of the active configs directory.
    #[must_use]
    pub fn active_configs_path(&self) -> PathBuf {
        self.kit_path.join(&self.active_configs_dir)
    }

    /// Extension used for diff files, e.g. `diff.txt`.
    #[must_use]
    pub fn diff_file_extension(&self) -> String {
        format!("diff.{}", self.configs_file_extension)
    }

    /// Path of a host's staged config.
    #[must_use]
    pub fn staged_config_file(&self, host_id: &str) -> PathBuf {
        self.staged_configs_path()
            .join(format!("{host_id}.{}", self.configs_file_extension))
    }
}

/// Pick the settings file: explicit argument, then environment, then default.
#[must_use]
pub fn resolve_settings_path(explicit: Option<&Path>, env_value: Option<String>) -> PathBuf {
    explicit.map_or_else(
        || {
            env_value
                .filter(|v| !v.is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE), PathBuf::from)
        },
        Path::to_path_buf,
    )
}

fn parse_raw(path: &Path, content: &str) -> Result<RawSettings, SettingsError> {
    let parse_err = |message: String| SettingsError::Parse {
        path: path.to_path_buf(),
        message,
    };
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
        Some("json") => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        _ => Err(SettingsError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn compile(field: &'static str, pattern: &str) -> Result<Regex, SettingsError> {
    Regex::new(pattern).map_err(|source| SettingsError::InvalidRegex { field, source })
}
