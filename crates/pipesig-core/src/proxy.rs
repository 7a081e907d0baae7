//! Relay loop between the controller's stdio and the child's channels

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;
use nix::sys::select::{pselect, FdSet};
use nix::sys::time::TimeSpec;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd};
use tracing::{debug, info, trace};

use pipesig_host_api::ChildNotifier;
use pipesig_util::{PipesigError, Result};

use crate::{ProxyEvent, ProxyState, TerminalReason};

/// The four streams the proxy moves bytes between
#[derive(Debug)]
pub struct Endpoints {
    /// Controller input (normally our stdin)
    pub controller_in: File,
    /// Controller output (normally our stdout)
    pub controller_out: File,
    /// Write end of the channel feeding the child's stdin
    pub child_in: File,
    /// Read end of the channel carrying the child's stdout
    pub child_out: File,
}

/// Fixed-capacity buffer holding at most one in-flight chunk
#[derive(Debug)]
pub struct RelayBuffer {
    buf: Box<[u8]>,
}

impl RelayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// Bidirectional relay driven by `pselect`
///
/// Parent-held channel ends are `None` once released.
pub struct ProxyLoop {
    controller_in: Option<File>,
    controller_out: File,
    child_in: Option<File>,
    child_out: Option<File>,
    buffer: RelayBuffer,
    state: ProxyState,
}

enum Readiness {
    Controller,
    Child,
}

impl ProxyLoop {
    pub fn new(endpoints: Endpoints, capacity: usize) -> Self {
        Self {
            controller_in: Some(endpoints.controller_in),
            controller_out: endpoints.controller_out,
            child_in: Some(endpoints.child_in),
            child_out: Some(endpoints.child_out),
            buffer: RelayBuffer::new(capacity),
            state: ProxyState::Running,
        }
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    /// Whether the parent still holds either channel end
    pub fn holds_channels(&self) -> bool {
        self.child_in.is_some() || self.child_out.is_some()
    }

    /// Relay until a terminal condition is reached
    ///
    /// A recorded child-termination notification takes priority over any
    /// readiness reported by the same wait. Read failures, and write
    /// failures other than EPIPE on controller output, are fatal.
    pub fn run<N: ChildNotifier>(&mut self, notifier: &N) -> Result<TerminalReason> {
        debug!(capacity = self.buffer.capacity(), "Proxy loop starting");

        loop {
            if let Some(reason) = self.state.terminal_reason() {
                return Ok(reason);
            }

            let ready = self.wait(notifier)?;

            if notifier.child_signaled() {
                self.apply(ProxyEvent::ChildSignaled);
                info!("Child termination notification received");
                continue;
            }

            for source in ready {
                match source {
                    Readiness::Controller => self.relay_inbound()?,
                    Readiness::Child => self.relay_outbound()?,
                }
                if self.state.is_terminal() {
                    break;
                }
            }
        }
    }

    /// Block until a watched source is readable or a signal interrupts
    fn wait<N: ChildNotifier>(&self, notifier: &N) -> Result<Vec<Readiness>> {
        let child_out = self
            .child_out
            .as_ref()
            .ok_or_else(|| PipesigError::host("child output channel already released"))?;

        let mut readfds = FdSet::new();
        let controller = self
            .controller_in
            .as_ref()
            .filter(|_| self.state.watches_controller());
        if let Some(input) = controller {
            readfds.insert(input.as_fd());
        }
        readfds.insert(child_out.as_fd());

        match pselect(
            None::<libc::c_int>,
            Some(&mut readfds),
            None::<&mut FdSet>,
            None::<&mut FdSet>,
            None::<&TimeSpec>,
            notifier.wait_mask(),
        ) {
            Ok(_) => {}
            Err(Errno::EINTR) => {
                trace!("pselect interrupted");
                return Ok(Vec::new());
            }
            Err(e) => return Err(PipesigError::wait("pselect", e)),
        }

        let mut ready = Vec::with_capacity(2);
        if controller.is_some_and(|input| readfds.contains(input.as_fd())) {
            ready.push(Readiness::Controller);
        }
        if readfds.contains(child_out.as_fd()) {
            ready.push(Readiness::Child);
        }
        Ok(ready)
    }

    /// Controller input -> child stdin
    fn relay_inbound(&mut self) -> Result<()> {
        let Some(input) = self.controller_in.as_mut() else {
            return Ok(());
        };

        let n = match input.read(&mut self.buffer.buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(PipesigError::relay("read", e)),
        };

        if n == 0 {
            // Stop watching the controller and pass EOF on to the child
            self.controller_in = None;
            self.child_in = None;
            self.apply(ProxyEvent::ControllerEof);
            info!("Controller input closed");
            return Ok(());
        }

        let child_in = self
            .child_in
            .as_mut()
            .ok_or_else(|| PipesigError::host("child input channel already released"))?;
        child_in
            .write_all(&self.buffer.buf[..n])
            .map_err(|e| PipesigError::relay("write", e))?;

        trace!(bytes = n, "Relayed controller input to child");
        Ok(())
    }

    /// Child stdout -> controller output
    fn relay_outbound(&mut self) -> Result<()> {
        let Some(output) = self.child_out.as_mut() else {
            return Ok(());
        };

        let n = match output.read(&mut self.buffer.buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(PipesigError::relay("read", e)),
        };

        if n == 0 {
            info!("Child output closed");
            self.apply(ProxyEvent::ChildOutputClosed);
            return Ok(());
        }

        match self.controller_out.write_all(&self.buffer.buf[..n]) {
            Ok(()) => {
                trace!(bytes = n, "Relayed child output to controller");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                info!("Controller output reader went away");
                self.apply(ProxyEvent::DownstreamGone);
                Ok(())
            }
            Err(e) => Err(PipesigError::relay("write", e)),
        }
    }

    /// Copy whatever the child already wrote, without blocking
    ///
    /// Stops at end-of-stream, when the channel is empty, or when the
    /// controller output is gone. Returns the number of bytes relayed.
    pub fn drain_child_output(&mut self) -> Result<usize> {
        let Some(output) = self.child_out.as_mut() else {
            return Ok(0);
        };

        set_nonblocking(output)?;

        let mut drained = 0;
        loop {
            let n = match output.read(&mut self.buffer.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PipesigError::relay("read", e)),
            };

            match self.controller_out.write_all(&self.buffer.buf[..n]) {
                Ok(()) => drained += n,
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
                Err(e) => return Err(PipesigError::relay("write", e)),
            }
        }

        debug!(bytes = drained, "Drained residual child output");
        Ok(drained)
    }

    /// Close both parent-held channel ends
    pub fn release_channels(&mut self) {
        self.child_in = None;
        self.child_out = None;
        debug!("Released channel ends");
    }

    /// Mark the session finished after shutdown
    pub fn finish(&mut self) {
        self.apply(ProxyEvent::ShutdownComplete);
    }

    fn apply(&mut self, event: ProxyEvent) {
        self.state = self.state.on_event(event);
    }
}

/// Switch a relayed stream to non-blocking reads
fn set_nonblocking(stream: &impl AsRawFd) -> Result<()> {
    let fd = stream.as_raw_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| PipesigError::relay("fcntl", e.into()))?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|e| PipesigError::relay("fcntl", e.into()))?;
    Ok(())
}
