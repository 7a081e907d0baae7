//! Mock host implementations for testing

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::SigSet;

use crate::{ChildControl, ChildNotifier, ExitStatus, HostError, HostResult};

/// Calls recorded by [`MockChild`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    Terminate,
    Kill,
    TryReap,
}

/// Mock child for unit testing shutdown sequencing
pub struct MockChild {
    pid: u32,
    calls: Mutex<Vec<MockCall>>,

    /// Status handed out by the first `try_reap`
    pub exit_status: Option<ExitStatus>,

    /// Configure termination requests to fail
    pub fail_stop: bool,
}

impl MockChild {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            calls: Mutex::new(Vec::new()),
            exit_status: None,
            fail_stop: false,
        }
    }

    /// A child that has already exited with the given status
    pub fn exited(pid: u32, status: ExitStatus) -> Self {
        Self {
            exit_status: Some(status),
            ..Self::new(pid)
        }
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ChildControl for MockChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn terminate(&self) -> HostResult<()> {
        self.record(MockCall::Terminate);
        if self.fail_stop {
            return Err(HostError::StopFailed("mock terminate failure".into()));
        }
        Ok(())
    }

    fn kill(&self) -> HostResult<()> {
        self.record(MockCall::Kill);
        if self.fail_stop {
            return Err(HostError::StopFailed("mock kill failure".into()));
        }
        Ok(())
    }

    fn try_reap(&mut self) -> HostResult<Option<ExitStatus>> {
        self.record(MockCall::TryReap);
        Ok(self.exit_status.take())
    }
}

/// Notifier driven by hand from tests
#[derive(Debug, Default)]
pub struct MockNotifier {
    signaled: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a child-termination notification
    pub fn raise(&self) {
        self.signaled.store(true, Ordering::SeqCst);
    }
}

impl ChildNotifier for MockNotifier {
    fn wait_mask(&self) -> Option<&SigSet> {
        None
    }

    fn child_signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_child_hands_out_status_once() {
        let mut child = MockChild::exited(42, ExitStatus::success());
        assert_eq!(child.try_reap().unwrap(), Some(ExitStatus::success()));
        assert_eq!(child.try_reap().unwrap(), None);
        assert_eq!(child.calls(), vec![MockCall::TryReap, MockCall::TryReap]);
    }

    #[test]
    fn mock_notifier_raise() {
        let notifier = MockNotifier::new();
        assert!(!notifier.child_signaled());
        notifier.raise();
        assert!(notifier.child_signaled());
        assert!(notifier.wait_mask().is_none());
    }
}
