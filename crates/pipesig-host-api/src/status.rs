//! Child exit status

use pipesig_util::FAILURE_STATUS;

/// Exit status captured from a reaped child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,

    /// Whether the process was killed by a signal
    pub signaled: bool,

    /// Signal number if signaled
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            signaled: false,
            signal: None,
        }
    }

    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signaled: false,
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signaled: true,
            signal: Some(signal),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Conventional process exit code for this status
    ///
    /// Normal exit reports the child's own code, death by signal `N`
    /// reports `128 + N`.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(sig)) => 128 + sig,
            (None, None) => FAILURE_STATUS,
        }
    }
}

/// Exit code for an optional captured status
pub fn exit_code_of(status: Option<ExitStatus>) -> i32 {
    status.map_or(FAILURE_STATUS, |s| s.exit_code())
}
