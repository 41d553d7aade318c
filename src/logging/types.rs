//! Core logging types: host entries, status, and the [`Log`] trait.

/// Per-host result for summary reporting.
#[derive(Debug, Clone)]
pub struct HostEntry {
    /// Host id.
    pub host: String,
    /// Final status of the host.
    pub status: HostStatus,
    /// Optional detail (skip reason, error description).
    pub message: Option<String>,
}

/// Status of a host after a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    /// The operation completed.
    Ok,
    /// The host lacked what the operation needs and was not attempted.
    Skipped,
    /// The batch was cancelled before the host was started.
    Cancelled,
    /// The operation failed on this host.
    Failed,
}

/// Abstraction over logging backends.
///
/// Both [`Logger`](super::logger::Logger) (direct output) and
/// [`BufferedLog`](super::buffered::BufferedLog) (deferred output for
/// concurrent hosts) implement this trait, so host processing code logs
/// without knowing whether output is immediate or buffered.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Record a host result for the summary.
    fn record_host(&self, host: &str, status: HostStatus, message: Option<&str>);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn host_status_equality() {
        assert_eq!(HostStatus::Ok, HostStatus::Ok);
        assert_ne!(HostStatus::Ok, HostStatus::Failed);
        assert_ne!(HostStatus::Skipped, HostStatus::Cancelled);
    }
}
