//! Structured logger with per-host summary collection.
use std::path::PathBuf;
use std::sync::Mutex;

use super::types::{HostEntry, HostStatus, Log};
use super::utils::log_file_path;

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Structured logger with per-host summary collection.
///
/// All messages are always written to a persistent log file at
/// `$XDG_CACHE_HOME/nectl/<command>.log` (default `~/.cache/nectl/<command>.log`)
/// with timestamps and ANSI codes stripped, regardless of console verbosity.
#[derive(Debug)]
pub struct Logger {
    hosts: Mutex<Vec<HostEntry>>,
    log_file: Option<PathBuf>,
    /// Serializes console output from concurrent host flushes.
    pub(super) flush_lock: Mutex<()>,
}

impl Logger {
    /// Create a new logger.
    ///
    /// Stores the log file path for display in the summary. The file itself
    /// is created by [`init_subscriber`](super::subscriber::init_subscriber).
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            hosts: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
            flush_lock: Mutex::new(()),
        }
    }

    /// Return the log file path, if available.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Return a clone of all recorded host entries.
    #[must_use]
    pub fn host_entries(&self) -> Vec<HostEntry> {
        self.hosts.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: "nectl::stage", "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose; always
    /// written to the log file).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Record a host result for the summary.
    pub fn record_host(&self, host: &str, status: HostStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.hosts.lock() {
            guard.push(HostEntry {
                host: host.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Count the hosts recorded as failed.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.hosts.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|h| h.status == HostStatus::Failed)
                .count()
        })
    }

    /// Print the summary of all recorded hosts.
    pub fn print_summary(&self) {
        let mut hosts = match self.hosts.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        if hosts.is_empty() {
            return;
        }
        hosts.sort_by(|a, b| a.host.cmp(&b.host));

        self.stage("Summary");

        let mut ok = 0u32;
        let mut skipped = 0u32;
        let mut cancelled = 0u32;
        let mut failed = 0u32;

        for entry in &hosts {
            let (icon, color) = match entry.status {
                HostStatus::Ok => {
                    ok += 1;
                    ("✓", "\x1b[32m")
                }
                HostStatus::Skipped => {
                    skipped += 1;
                    ("○", "\x1b[33m")
                }
                HostStatus::Cancelled => {
                    cancelled += 1;
                    ("·", "\x1b[2m")
                }
                HostStatus::Failed => {
                    failed += 1;
                    ("✗", "\x1b[31m")
                }
            };

            let suffix = entry
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", entry.host));
        }

        let total = ok + skipped + cancelled + failed;
        self.info(&format!(
            "{total} hosts: \x1b[32m{ok} ok\x1b[0m, \x1b[33m{skipped} skipped\x1b[0m, \x1b[2m{cancelled} cancelled\x1b[0m, \x1b[31m{failed} failed\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error);

    fn record_host(&self, host: &str, status: HostStatus, message: Option<&str>) {
        self.record_host(host, status, message);
    }
}
