//! Driver and backend error types.
use std::fmt::Write as _;
use std::io;

use thiserror::Error;

/// Message used whenever the candidate configuration lock cannot be taken.
pub const LOCK_FAILED: &str = "failed to take lock ensure no user in config mode";

/// Message carried by [`DriverError::CommitDisconnect`].
pub const CONNECTION_LOST_AFTER_COMMIT: &str = "host connection lost after commit";

/// Errors surfaced by a [`Driver`](super::Driver).
///
/// All of these are isolated to the host they happened on.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Generic driver failure (connection, lock, protocol).
    #[error("{0}")]
    Failed(String),

    /// The candidate configuration was rejected or could not be read.
    #[error("{message}")]
    ConfigLoad {
        /// Human readable summary, one numbered entry per error.
        message: String,
        /// Structured errors reported by the device, if any.
        errors: Vec<RpcError>,
    },

    /// The connection was lost after a commit; the outcome is uncertain.
    #[error("{reason}")]
    CommitDisconnect {
        /// Why the commit could not be confirmed.
        reason: String,
        /// Diff that was being committed.
        diff: String,
    },

    /// No driver is registered for a host.
    #[error("{0}")]
    NotFound(String),

    /// A data method was called without an open connection.
    #[error("'{method}' must be run on an open connection")]
    NotConnected {
        /// Name of the offending method.
        method: &'static str,
    },
}

impl DriverError {
    /// Build a [`DriverError::ConfigLoad`] from device errors.
    #[must_use]
    pub fn rejected(errors: Vec<RpcError>) -> Self {
        let mut message = format!("host rejected config due to {} errors:\n", errors.len());
        for (i, e) in errors.iter().enumerate() {
            let _ = writeln!(message, "{}:", i + 1);
            if let Some(path) = &e.path {
                let _ = writeln!(message, "  path: {path}");
            }
            if let Some(element) = &e.element {
                let _ = writeln!(message, "  element: '{element}'");
            }
            let _ = writeln!(message, "  error: {}", e.message);
        }
        Self::ConfigLoad { message, errors }
    }

    /// Diff carried by the error, recorded as the host's output.
    #[must_use]
    pub fn carried_diff(&self) -> Option<&str> {
        match self {
            Self::CommitDisconnect { diff, .. } => Some(diff),
            _ => None,
        }
    }
}

/// One error reported by a device in response to an RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcError {
    /// Configuration hierarchy the error refers to.
    pub path: Option<String>,
    /// Offending element or statement.
    pub element: Option<String>,
    /// Error text.
    pub message: String,
}

/// Failures of a protocol [`Backend`](super::Backend), classified so the
/// driver can normalise them.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The configuration database is locked by someone else.
    #[error("configuration database locked: {0}")]
    Lock(String),

    /// The device rejected the candidate.
    #[error("candidate rejected with {} errors", .0.len())]
    Rejected(Vec<RpcError>),

    /// The device did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The device refused the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The device cannot be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The device answered with something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local I/O failure on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BackendError {
    /// Returns `true` if the error means the management session is gone.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Auth(_) | Self::Unreachable(_) | Self::Io(_)
        )
    }

    /// Normalise into a [`DriverError`] outside of a commit.
    #[must_use]
    pub fn into_driver_error(self) -> DriverError {
        match self {
            Self::Lock(_) => DriverError::Failed(LOCK_FAILED.to_string()),
            Self::Rejected(errors) => DriverError::rejected(errors),
            Self::Auth(e) => {
                DriverError::Failed(format!("host reachable but authentication failed: {e}"))
            }
            Self::Unreachable(e) | Self::Timeout(e) => {
                DriverError::Failed(format!("connection failed host is unreachable: {e}"))
            }
            Self::Protocol(e) => DriverError::Failed(format!("host reachable but session failed: {e}")),
            Self::Io(e) => DriverError::Failed(format!("transport I/O error: {e}")),
        }
    }
}
