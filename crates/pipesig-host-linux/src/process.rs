//! Child process management

use nix::sys::signal::{self, SigSet, SigmaskHow, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use tracing::debug;

use pipesig_host_api::{ChildControl, ExitStatus, HostError, HostResult};
use pipesig_util::{PipesigError, Result};

use crate::ChildEnds;

/// The supervised child, with stdin/stdout bound to private channels
pub struct LinuxChild {
    child: Child,
    pid: u32,
    reaped: bool,
}

impl LinuxChild {
    /// Spawn `argv[0]` (resolved through `PATH`) with `argv[1..]` as arguments
    ///
    /// The child's stdin and stdout are replaced by `ends`; stderr is
    /// inherited. Before exec the child reinstates `restore_mask`, the mask
    /// that was in effect before SIGCHLD was blocked. The parent's copies of
    /// the child ends are closed before this returns.
    ///
    /// A failed exec (missing program, permission denied) does not show up
    /// as a child exit code. `Command` reports it back to the parent before
    /// `spawn` returns, and it surfaces here as a `Setup` error naming
    /// `fork`, which the binary turns into exit status -1 (255). No child is
    /// left behind to reap.
    pub fn launch(argv: &[String], ends: ChildEnds, restore_mask: &SigSet) -> Result<Self> {
        if argv.is_empty() {
            return Err(PipesigError::config("Empty argv"));
        }

        let program = &argv[0];
        let args = &argv[1..];

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::from(ends.stdin));
        cmd.stdout(Stdio::from(ends.stdout));
        cmd.stderr(Stdio::inherit());

        let mask = *restore_mask;
        // SAFETY: sigprocmask is async-signal-safe
        unsafe {
            cmd.pre_exec(move || {
                signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&mask), None)?;
                Ok(())
            });
        }

        let spawned = cmd.spawn();
        // Release the child's ends held by the builder
        drop(cmd);

        let child = spawned.map_err(|e| PipesigError::setup_io("fork", e))?;
        let pid = child.id();

        debug!(pid = pid, program = %program, "Process spawned");

        Ok(Self {
            child,
            pid,
            reaped: false,
        })
    }

    fn send(&self, sig: Signal) -> HostResult<()> {
        if self.reaped {
            // The pid may already belong to someone else
            debug!(pid = self.pid, signal = %sig, "Child already reaped, not signalling");
            return Ok(());
        }

        match signal::kill(Pid::from_raw(self.pid as i32), sig) {
            Ok(()) => {
                debug!(pid = self.pid, signal = %sig, "Sent signal to child");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => {
                // Process already gone
                Ok(())
            }
            Err(e) => Err(HostError::StopFailed(format!(
                "Failed to send {}: {}",
                sig, e
            ))),
        }
    }
}

impl ChildControl for LinuxChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn terminate(&self) -> HostResult<()> {
        self.send(Signal::SIGTERM)
    }

    fn kill(&self) -> HostResult<()> {
        self.send(Signal::SIGKILL)
    }

    fn try_reap(&mut self) -> HostResult<Option<ExitStatus>> {
        if self.reaped {
            return Ok(None);
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.reaped = true;
                let exit_status = if let Some(code) = status.code() {
                    ExitStatus::with_code(code)
                } else {
                    use std::os::unix::process::ExitStatusExt;
                    match status.signal() {
                        Some(sig) => ExitStatus::signaled(sig),
                        None => ExitStatus::with_code(-1),
                    }
                };
                debug!(pid = self.pid, status = ?exit_status, "Child reaped");
                Ok(Some(exit_status))
            }
            Ok(None) => Ok(None), // Still running
            Err(e) => Err(HostError::WaitFailed(e.to_string())),
        }
    }
}
