//! Signal gate for SIGCHLD and SIGPIPE
//!
//! Arming the gate blocks SIGCHLD for the calling thread (the whole process
//! when single-threaded), installs a handler that only records the
//! notification, and ignores SIGPIPE so writes to a vanished reader fail
//! with EPIPE. The proxy loop then unblocks SIGCHLD atomically inside
//! `pselect` via [`ChildNotifier::wait_mask`], so a notification is either
//! seen through the flag before the wait or interrupts the wait.

use nix::libc;
use nix::sys::signal::{
    sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use pipesig_host_api::ChildNotifier;
use pipesig_util::{PipesigError, Result};

static CHILD_SIGNALED: AtomicBool = AtomicBool::new(false);
static GATE_ARMED: AtomicBool = AtomicBool::new(false);

extern "C" fn record_child_signal(_signo: libc::c_int) {
    CHILD_SIGNALED.store(true, Ordering::SeqCst);
}

/// Armed SIGCHLD/SIGPIPE dispositions, restored on drop
///
/// Only one gate can be armed at a time.
pub struct SignalGate {
    original_mask: SigSet,
    wait_mask: SigSet,
    prev_chld: SigAction,
    prev_pipe: SigAction,
}

impl SignalGate {
    /// Block SIGCHLD, install the recording handler, ignore SIGPIPE
    ///
    /// Must run before the child is created.
    pub fn arm() -> Result<Self> {
        if GATE_ARMED.swap(true, Ordering::SeqCst) {
            return Err(PipesigError::host("signal gate already armed"));
        }
        CHILD_SIGNALED.store(false, Ordering::SeqCst);

        let mut blocked = SigSet::empty();
        blocked.add(Signal::SIGCHLD);

        let mut original_mask = SigSet::empty();
        if let Err(e) = sigprocmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut original_mask))
        {
            GATE_ARMED.store(false, Ordering::SeqCst);
            return Err(PipesigError::setup("sigprocmask", e));
        }

        let record = SigAction::new(
            SigHandler::Handler(record_child_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe
        let prev_chld = match unsafe { sigaction(Signal::SIGCHLD, &record) } {
            Ok(prev) => prev,
            Err(e) => {
                restore_mask(&original_mask);
                GATE_ARMED.store(false, Ordering::SeqCst);
                return Err(PipesigError::setup("sigaction", e));
            }
        };

        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        // SAFETY: SIG_IGN installs no handler code
        let prev_pipe = match unsafe { sigaction(Signal::SIGPIPE, &ignore) } {
            Ok(prev) => prev,
            Err(e) => {
                // SAFETY: reinstating the disposition we just replaced
                let _ = unsafe { sigaction(Signal::SIGCHLD, &prev_chld) };
                restore_mask(&original_mask);
                GATE_ARMED.store(false, Ordering::SeqCst);
                return Err(PipesigError::setup("sigaction", e));
            }
        };

        // Waiting must let SIGCHLD through even if the caller had it blocked
        let mut wait_mask = original_mask;
        wait_mask.remove(Signal::SIGCHLD);

        debug!("Signal gate armed");

        Ok(Self {
            original_mask,
            wait_mask,
            prev_chld,
            prev_pipe,
        })
    }

    /// Signal mask in effect before the gate was armed
    pub fn original_mask(&self) -> &SigSet {
        &self.original_mask
    }
}

impl ChildNotifier for SignalGate {
    fn wait_mask(&self) -> Option<&SigSet> {
        Some(&self.wait_mask)
    }

    fn child_signaled(&self) -> bool {
        CHILD_SIGNALED.load(Ordering::SeqCst)
    }
}

impl Drop for SignalGate {
    fn drop(&mut self) {
        // SAFETY: reinstating dispositions captured at arm time
        unsafe {
            if let Err(e) = sigaction(Signal::SIGPIPE, &self.prev_pipe) {
                warn!(error = %e, "Failed to restore SIGPIPE disposition");
            }
            if let Err(e) = sigaction(Signal::SIGCHLD, &self.prev_chld) {
                warn!(error = %e, "Failed to restore SIGCHLD disposition");
            }
        }
        restore_mask(&self.original_mask);
        GATE_ARMED.store(false, Ordering::SeqCst);
        debug!("Signal gate disarmed");
    }
}

fn restore_mask(mask: &SigSet) {
    if let Err(e) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(mask), None) {
        warn!(error = %e, "Failed to restore signal mask");
    }
}
