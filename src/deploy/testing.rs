//! Scripted driver for exercising the batch runner without devices.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::drivers::{ApplyProgress, ConfigFormat, Driver, DriverError, PendingCommit, StagedConfig};
use crate::logging::Log;

/// How a [`ScriptedDriver`] behaves.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    pub fail_open: bool,
    pub fail_close: bool,
    /// Diff returned by compare and apply; empty means unchanged.
    pub diff: String,
    /// `begin_apply` loses the host right after committing.
    pub lose_after_commit: bool,
    /// `confirm_commit` loses the host.
    pub fail_confirm: bool,
    /// `confirm_commit` panics.
    pub panic_confirm: bool,
    /// Time `confirm_commit` takes.
    pub confirm_delay: Duration,
    /// Tripped once `begin_apply` has committed.
    pub cancel_on_commit: Option<CancelToken>,
}

#[derive(Debug, Default)]
struct Calls {
    close_attempts: usize,
    closed: bool,
    commits: usize,
    confirms: usize,
    confirm_started: Option<Instant>,
}

/// Shared view of what a [`ScriptedDriver`] was asked to do.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Calls>>);

impl Recorder {
    fn with<T>(&self, f: impl FnOnce(&mut Calls) -> T) -> T {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn closed(&self) -> bool {
        self.with(|c| c.closed)
    }

    pub(crate) fn close_attempted(&self) -> bool {
        self.with(|c| c.close_attempts > 0)
    }

    pub(crate) fn commits(&self) -> usize {
        self.with(|c| c.commits)
    }

    pub(crate) fn confirms(&self) -> usize {
        self.with(|c| c.confirms)
    }

    pub(crate) fn confirm_started(&self) -> Option<Instant> {
        self.with(|c| c.confirm_started)
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedDriver {
    host_id: String,
    script: Script,
    connected: bool,
    recorder: Recorder,
}

impl ScriptedDriver {
    pub(crate) fn new(host_id: &str, script: Script) -> (Self, Recorder) {
        let recorder = Recorder::default();
        (
            Self {
                host_id: host_id.to_string(),
                script,
                connected: false,
                recorder: recorder.clone(),
            },
            recorder,
        )
    }

    fn lost(&self) -> DriverError {
        DriverError::CommitDisconnect {
            reason: "host connection lost after commit: timed out".to_string(),
            diff: self.script.diff.clone(),
        }
    }
}

impl Driver for ScriptedDriver {
    fn host_id(&self) -> &str {
        &self.host_id
    }

    fn open(&mut self, _log: &dyn Log) -> Result<(), DriverError> {
        if self.script.fail_open {
            return Err(DriverError::Failed(
                "connection failed host is unreachable".to_string(),
            ));
        }
        self.connected = true;
        Ok(())
    }

    fn close(&mut self, _log: &dyn Log) -> Result<(), DriverError> {
        self.recorder.with(|c| c.close_attempts += 1);
        self.connected = false;
        if self.script.fail_close {
            return Err(DriverError::Failed("close failed".to_string()));
        }
        self.recorder.with(|c| c.closed = true);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_config(
        &mut self,
        format: Option<ConfigFormat>,
        _sanitized: bool,
        _log: &dyn Log,
    ) -> Result<String, DriverError> {
        Ok(format!(
            "running config of {} as {}",
            self.host_id,
            format.unwrap_or(ConfigFormat::Text)
        ))
    }

    fn compare_config(
        &mut self,
        staged: &StagedConfig,
        _log: &dyn Log,
    ) -> Result<String, DriverError> {
        staged.read()?;
        Ok(self.script.diff.clone())
    }

    fn begin_apply(
        &mut self,
        staged: &StagedConfig,
        rollback_minutes: u32,
        _log: &dyn Log,
    ) -> Result<ApplyProgress, DriverError> {
        staged.read()?;
        if self.script.diff.is_empty() {
            return Ok(ApplyProgress::Unchanged);
        }
        self.recorder.with(|c| c.commits += 1);
        if let Some(cancel) = &self.script.cancel_on_commit {
            cancel.cancel();
        }
        if self.script.lose_after_commit {
            return Err(self.lost());
        }
        Ok(ApplyProgress::Pending(PendingCommit {
            diff: self.script.diff.clone(),
            settle: Duration::from_secs(3600),
            rollback_minutes,
        }))
    }

    fn confirm_commit(
        &mut self,
        pending: &PendingCommit,
        _log: &dyn Log,
    ) -> Result<String, DriverError> {
        self.recorder.with(|c| {
            c.confirms += 1;
            c.confirm_started = Some(Instant::now());
        });
        std::thread::sleep(self.script.confirm_delay);
        assert!(!self.script.panic_confirm, "confirm of {} blew up", self.host_id);
        if self.script.fail_confirm {
            return Err(self.lost());
        }
        Ok(pending.diff.clone())
    }
}
