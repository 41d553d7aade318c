//! The [`Driver`] lifecycle and the commit-confirm protocol shared by every backend.
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::backend::{Backend, LoadMode};
use super::error::{BackendError, CONNECTION_LOST_AFTER_COMMIT, DriverError};
use super::format::ConfigFormat;
use super::registry::DriverTarget;
use crate::logging::Log;

/// Time to wait after a confirmed commit before confirming it: three
/// quarters of the rollback timer, which is never shorter than one minute.
#[must_use]
pub fn settle_duration(rollback_minutes: u32) -> Duration {
    Duration::from_secs(u64::from(rollback_minutes.max(1)) * 45)
}

/// A rendered config waiting on disk to be compared or applied.
#[derive(Debug, Clone)]
pub struct StagedConfig {
    path: PathBuf,
    format: Option<ConfigFormat>,
}

impl StagedConfig {
    /// Staged config at `path`, format detected from its content.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
        }
    }

    /// Force the format instead of detecting it.
    #[must_use]
    pub const fn with_format(mut self, format: Option<ConfigFormat>) -> Self {
        self.format = format;
        self
    }

    /// Location of the staged file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the staged document.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::ConfigLoad`] if the file is missing or unreadable.
    pub fn read(&self) -> Result<String, DriverError> {
        fs::read_to_string(&self.path).map_err(|e| {
            let message = if e.kind() == io::ErrorKind::NotFound {
                format!("config file not found: {}", self.path.display())
            } else {
                format!("failed to read config file {}: {e}", self.path.display())
            };
            DriverError::ConfigLoad {
                message,
                errors: Vec::new(),
            }
        })
    }

    fn format_for(&self, config: &str, fallback: ConfigFormat) -> ConfigFormat {
        self.format
            .or_else(|| ConfigFormat::detect(config))
            .unwrap_or(fallback)
    }
}

/// A commit waiting for its settle period to pass before being confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    /// Diff that was committed.
    pub diff: String,
    /// How long to wait before confirming.
    pub settle: Duration,
    /// Rollback timer armed on the device, in minutes.
    pub rollback_minutes: u32,
}

/// Result of the first half of an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyProgress {
    /// Nothing to change; no commit was made.
    Unchanged,
    /// Committed with a rollback timer; must be confirmed after settling.
    Pending(PendingCommit),
}

/// A device protocol driver.
///
/// Lifecycle: `open` → data methods → `close`. Data methods fail with
/// [`DriverError::NotConnected`] outside of an open connection.
pub trait Driver: Send + fmt::Debug {
    /// Id of the host this driver talks to.
    fn host_id(&self) -> &str;

    /// Open the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is unreachable or refuses the session.
    fn open(&mut self, log: &dyn Log) -> Result<(), DriverError>;

    /// Close the connection. Closing a closed driver is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be torn down cleanly.
    fn close(&mut self, log: &dyn Log) -> Result<(), DriverError>;

    /// Returns `true` while the connection is open.
    fn is_connected(&self) -> bool;

    /// Fetch the running configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or the device call fails.
    fn get_config(
        &mut self,
        format: Option<ConfigFormat>,
        sanitized: bool,
        log: &dyn Log,
    ) -> Result<String, DriverError>;

    /// Diff the staged config against the running one without committing.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected, the lock is held, or the candidate
    /// is rejected.
    fn compare_config(&mut self, staged: &StagedConfig, log: &dyn Log)
    -> Result<String, DriverError>;

    /// Load, check and commit the staged config with an automatic rollback,
    /// then reconnect to prove the host is still manageable.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::CommitDisconnect`] if the host is lost after the
    /// commit; other errors as for [`Self::compare_config`].
    fn begin_apply(
        &mut self,
        staged: &StagedConfig,
        rollback_minutes: u32,
        log: &dyn Log,
    ) -> Result<ApplyProgress, DriverError>;

    /// Confirm a pending commit, cancelling the device's rollback timer.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::CommitDisconnect`] if the host cannot be reached.
    fn confirm_commit(&mut self, pending: &PendingCommit, log: &dyn Log)
    -> Result<String, DriverError>;

    /// Apply and confirm in one blocking call, returning the applied diff.
    ///
    /// # Errors
    ///
    /// As for [`Self::begin_apply`] and [`Self::confirm_commit`].
    fn apply_config(
        &mut self,
        staged: &StagedConfig,
        rollback_minutes: u32,
        log: &dyn Log,
    ) -> Result<String, DriverError> {
        match self.begin_apply(staged, rollback_minutes, log)? {
            ApplyProgress::Unchanged => Ok(String::new()),
            ApplyProgress::Pending(pending) => {
                std::thread::sleep(pending.settle);
                self.confirm_commit(&pending, log)
            }
        }
    }
}

/// [`Driver`] implemented once over any [`Backend`].
pub struct NetworkDriver<B> {
    host_id: String,
    commit_comment: String,
    backend: B,
    connected: bool,
}

impl<B> fmt::Debug for NetworkDriver<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkDriver")
            .field("host_id", &self.host_id)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> NetworkDriver<B> {
    /// Wrap `backend` for the host described by `target`.
    #[must_use]
    pub fn new(target: &DriverTarget, backend: B) -> Self {
        Self {
            host_id: target.host_id.clone(),
            commit_comment: target.commit_comment.clone(),
            backend,
            connected: false,
        }
    }

    const fn ensure_connected(&self, method: &'static str) -> Result<(), DriverError> {
        if self.connected {
            Ok(())
        } else {
            Err(DriverError::NotConnected { method })
        }
    }

    /// Lock, load and check the candidate, returning its diff.
    ///
    /// On success the lock is still held; on failure it has been released.
    fn stage_candidate(&mut self, staged: &StagedConfig, log: &dyn Log) -> Result<String, DriverError> {
        let config = staged.read()?;
        let format = staged.format_for(&config, self.backend.default_format());

        self.backend
            .lock()
            .map_err(BackendError::into_driver_error)?;
        log.debug(&format!("[{}] took config lock", self.host_id));

        match self.load_and_diff(&config, format) {
            Ok(diff) => {
                log.debug(&format!("[{}] config check passed", self.host_id));
                Ok(diff)
            }
            Err(e) => {
                self.release(log);
                Err(e.into_driver_error())
            }
        }
    }

    fn load_and_diff(&mut self, config: &str, format: ConfigFormat) -> Result<String, BackendError> {
        if format.is_line_oriented() {
            self.backend.load("delete", format, LoadMode::Merge)?;
            self.backend.load(config, format, LoadMode::Merge)?;
        } else {
            self.backend.load(config, format, LoadMode::Replace)?;
        }
        self.backend.commit_check()?;
        let diff = self.backend.diff()?;
        Ok(if diff.trim().is_empty() {
            String::new()
        } else {
            diff.trim_matches('\n').to_string()
        })
    }

    /// Drop the candidate and the lock, logging failures.
    fn release(&mut self, log: &dyn Log) {
        if let Err(e) = self.backend.discard() {
            log.warn(&format!("[{}] failed to discard candidate: {e}", self.host_id));
        }
        match self.backend.unlock() {
            Ok(()) => log.debug(&format!("[{}] released config lock", self.host_id)),
            Err(e) => log.warn(&format!("[{}] failed to release config lock: {e}", self.host_id)),
        }
    }

    fn lost_after_commit(&mut self, cause: &BackendError, diff: String) -> DriverError {
        self.connected = false;
        DriverError::CommitDisconnect {
            reason: format!("{CONNECTION_LOST_AFTER_COMMIT}: {cause}"),
            diff,
        }
    }
}

impl<B: Backend> Driver for NetworkDriver<B> {
    fn host_id(&self) -> &str {
        &self.host_id
    }

    fn open(&mut self, log: &dyn Log) -> Result<(), DriverError> {
        log.debug(&format!("[{}] opening connection to host", self.host_id));
        self.backend
            .connect()
            .map_err(BackendError::into_driver_error)?;
        self.connected = true;
        Ok(())
    }

    fn close(&mut self, log: &dyn Log) -> Result<(), DriverError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        log.debug(&format!("[{}] closing connection to host", self.host_id));
        self.backend
            .disconnect()
            .map_err(BackendError::into_driver_error)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_config(
        &mut self,
        format: Option<ConfigFormat>,
        sanitized: bool,
        _log: &dyn Log,
    ) -> Result<String, DriverError> {
        self.ensure_connected("get_config")?;
        let format = format.unwrap_or_else(|| self.backend.default_format());
        self.backend
            .running_config(format, sanitized)
            .map_err(BackendError::into_driver_error)
    }

    fn compare_config(
        &mut self,
        staged: &StagedConfig,
        log: &dyn Log,
    ) -> Result<String, DriverError> {
        self.ensure_connected("compare_config")?;
        let diff = self.stage_candidate(staged, log)?;
        if diff.is_empty() {
            log.info(&format!("[{}] no changes skipping", self.host_id));
        } else {
            log.info(&format!("[{}] has changes but not committing", self.host_id));
        }
        self.release(log);
        Ok(diff)
    }

    fn begin_apply(
        &mut self,
        staged: &StagedConfig,
        rollback_minutes: u32,
        log: &dyn Log,
    ) -> Result<ApplyProgress, DriverError> {
        self.ensure_connected("apply_config")?;
        let diff = self.stage_candidate(staged, log)?;
        if diff.is_empty() {
            log.info(&format!("[{}] no changes skipping", self.host_id));
            self.release(log);
            return Ok(ApplyProgress::Unchanged);
        }

        let minutes = rollback_minutes.max(1);
        if let Err(e) = self.backend.commit_confirmed(minutes, &self.commit_comment) {
            if e.is_disconnect() {
                return Err(self.lost_after_commit(&e, diff));
            }
            self.release(log);
            return Err(e.into_driver_error());
        }
        log.info(&format!(
            "[{}] config committed with {minutes} minutes automatic rollback",
            self.host_id
        ));

        log.debug(&format!("[{}] restarting connection", self.host_id));
        if let Err(e) = self.backend.disconnect() {
            log.debug(&format!("[{}] error closing connection: {e}", self.host_id));
        }
        self.connected = false;
        if let Err(e) = self.backend.connect() {
            return Err(self.lost_after_commit(&e, diff));
        }
        self.connected = true;
        log.info(&format!("[{}] restarted connection", self.host_id));

        let settle = settle_duration(rollback_minutes);
        log.info(&format!(
            "[{}] waiting {} minutes for config to settle",
            self.host_id,
            settle.as_secs_f64() / 60.0
        ));
        Ok(ApplyProgress::Pending(PendingCommit {
            diff,
            settle,
            rollback_minutes: minutes,
        }))
    }

    fn confirm_commit(
        &mut self,
        pending: &PendingCommit,
        log: &dyn Log,
    ) -> Result<String, DriverError> {
        self.ensure_connected("confirm_commit")?;
        match self.backend.confirm() {
            Ok(()) => {
                log.info(&format!("[{}] config commit confirmed", self.host_id));
                Ok(pending.diff.clone())
            }
            Err(e) if e.is_disconnect() => Err(self.lost_after_commit(&e, pending.diff.clone())),
            Err(e) => Err(e.into_driver_error()),
        }
    }
}
