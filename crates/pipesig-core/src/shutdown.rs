//! Shutdown sequence run once the proxy loop stops

use nix::errno::Errno;
use nix::libc;
use nix::sys::select::{pselect, FdSet};
use nix::sys::time::TimeSpec;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use pipesig_host_api::{ChildControl, ChildNotifier, ExitStatus};

use crate::{PeerCause, ProxyLoop, TerminalReason};

/// Tear down the child after the relay loop stopped
///
/// On `PeerGone` the channel ends are released and the child is sent
/// SIGTERM. When the child closed its own output it is first given up to
/// `grace` to deliver its termination notification, so a child that is
/// already exiting keeps its real status and the SIGTERM lands on a zombie.
/// When the downstream reader vanished the SIGTERM goes out at once and the
/// grace wait follows it. On `ChildSignaled` output the child wrote before
/// dying is drained first. In every case the child is reaped without
/// blocking and finally sent SIGKILL. Returns the captured exit status, if
/// any.
pub fn shutdown<C, N>(
    proxy: &mut ProxyLoop,
    child: &mut C,
    notifier: &N,
    reason: TerminalReason,
    grace: Duration,
) -> Option<ExitStatus>
where
    C: ChildControl,
    N: ChildNotifier,
{
    info!(pid = child.pid(), ?reason, "Shutting down child");

    match reason {
        TerminalReason::PeerGone(PeerCause::ChildClosed) => {
            proxy.release_channels();
            await_notification(notifier, grace);
            request_termination(child);
        }
        TerminalReason::PeerGone(PeerCause::DownstreamGone) => {
            proxy.release_channels();
            request_termination(child);
            await_notification(notifier, grace);
        }
        TerminalReason::ChildSignaled => {
            if let Err(e) = proxy.drain_child_output() {
                warn!(error = %e, "Failed to drain child output");
            }
        }
    }

    let status = match child.try_reap() {
        Ok(status) => status,
        Err(e) => {
            warn!(pid = child.pid(), error = %e, "Failed to reap child");
            None
        }
    };

    // Parting shot; harmless if the child is already gone
    if let Err(e) = child.kill() {
        warn!(pid = child.pid(), error = %e, "Failed to kill child");
    }

    proxy.finish();

    match status {
        Some(status) => info!(pid = child.pid(), ?status, "Child exited"),
        None => info!(pid = child.pid(), "No exit status captured"),
    }
    status
}

fn request_termination<C: ChildControl>(child: &C) {
    if let Err(e) = child.terminate() {
        warn!(pid = child.pid(), error = %e, "Failed to request child termination");
    }
}

/// Wait up to `grace` for the child-termination notification
fn await_notification<N: ChildNotifier>(notifier: &N, grace: Duration) {
    let deadline = Instant::now() + grace;

    while !notifier.child_signaled() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!("Grace period elapsed without termination notification");
            return;
        }

        let timeout = TimeSpec::from_duration(remaining);
        match pselect(
            None::<libc::c_int>,
            None::<&mut FdSet>,
            None::<&mut FdSet>,
            None::<&mut FdSet>,
            Some(&timeout),
            notifier.wait_mask(),
        ) {
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => {
                warn!(error = %e, "pselect failed while awaiting child exit");
                return;
            }
        }
    }
}
