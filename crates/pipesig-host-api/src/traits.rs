//! Host trait definitions

use nix::sys::signal::SigSet;
use thiserror::Error;

use crate::ExitStatus;

/// Errors from host operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Stop failed: {0}")]
    StopFailed(String),

    #[error("Wait failed: {0}")]
    WaitFailed(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Control over the single supervised child
///
/// Implementations own the child exclusively. Termination requests must be
/// idempotent: signalling a child that is already gone is not an error.
pub trait ChildControl {
    /// Operating-system process id
    fn pid(&self) -> u32;

    /// Request graceful termination (SIGTERM)
    fn terminate(&self) -> HostResult<()>;

    /// Request forceful, non-ignorable termination (SIGKILL)
    fn kill(&self) -> HostResult<()>;

    /// Reap the child without blocking
    ///
    /// Returns `Ok(None)` while the child is still running.
    fn try_reap(&mut self) -> HostResult<Option<ExitStatus>>;
}

/// Source of child-termination notifications for the proxy loop
pub trait ChildNotifier {
    /// Signal mask installed atomically for the duration of each wait.
    ///
    /// `None` leaves the caller's mask untouched while waiting.
    fn wait_mask(&self) -> Option<&SigSet>;

    /// Whether a child-termination notification has been recorded
    fn child_signaled(&self) -> bool;
}
