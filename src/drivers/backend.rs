//! Protocol primitives a vendor backend supplies to [`NetworkDriver`](super::NetworkDriver).
use super::error::BackendError;
use super::format::ConfigFormat;

/// How a candidate is combined with the existing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Statements are applied on top of the candidate.
    Merge,
    /// The candidate is replaced by the loaded document.
    Replace,
}

/// Vendor protocol session.
///
/// Methods map one-to-one to device operations; sequencing, state checks
/// and error normalisation live in the driver.
#[cfg_attr(test, mockall::automock)]
pub trait Backend: Send {
    /// Open the management session.
    fn connect(&mut self) -> Result<(), BackendError>;

    /// Close the management session.
    fn disconnect(&mut self) -> Result<(), BackendError>;

    /// Format used when none is configured or detected.
    fn default_format(&self) -> ConfigFormat;

    /// Fetch the running configuration.
    fn running_config(
        &mut self,
        format: ConfigFormat,
        sanitized: bool,
    ) -> Result<String, BackendError>;

    /// Take the exclusive candidate lock.
    fn lock(&mut self) -> Result<(), BackendError>;

    /// Release the candidate lock.
    fn unlock(&mut self) -> Result<(), BackendError>;

    /// Load a document into the candidate.
    fn load(&mut self, config: &str, format: ConfigFormat, mode: LoadMode)
    -> Result<(), BackendError>;

    /// Validate the candidate without committing.
    fn commit_check(&mut self) -> Result<(), BackendError>;

    /// Diff between running and candidate; empty when identical.
    fn diff(&mut self) -> Result<String, BackendError>;

    /// Throw away the candidate.
    fn discard(&mut self) -> Result<(), BackendError>;

    /// Commit with an automatic rollback after `minutes`.
    fn commit_confirmed(&mut self, minutes: u32, comment: &str) -> Result<(), BackendError>;

    /// Confirm a pending commit, cancelling its rollback.
    fn confirm(&mut self) -> Result<(), BackendError>;
}
