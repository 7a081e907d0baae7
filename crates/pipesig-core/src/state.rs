//! Proxy state machine

use tracing::{debug, warn};

/// Why the relay loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// A child-termination notification was observed
    ChildSignaled,
    /// The child closed its output or the downstream reader went away
    PeerGone(PeerCause),
}

/// Which side of the outbound relay went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCause {
    /// Child output reached end-of-stream; the child is usually exiting
    ChildClosed,
    /// Writing downstream hit EPIPE; the child may still be running
    DownstreamGone,
}

/// Inputs that drive [`ProxyState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyEvent {
    /// Controller input reached end-of-stream
    ControllerEof,
    /// Child output reached end-of-stream
    ChildOutputClosed,
    /// Writing child output downstream hit EPIPE
    DownstreamGone,
    /// The signal gate recorded a child-termination notification
    ChildSignaled,
    /// The shutdown sequence finished
    ShutdownComplete,
}

/// Lifecycle of one proxy session
///
/// ```text
/// Running --ControllerEof--> ControllerGone
/// Running | ControllerGone --ChildOutputClosed | DownstreamGone--> PeerGone(cause)
/// Running | ControllerGone --ChildSignaled--> Signaled
/// PeerGone | Signaled --ShutdownComplete--> Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyState {
    /// Relaying in both directions
    #[default]
    Running,
    /// Controller input closed; still relaying child output
    ControllerGone,
    /// Terminal: child output closed or downstream vanished
    PeerGone(PeerCause),
    /// Terminal: child-termination notification observed
    Signaled,
    /// Shutdown finished
    Done,
}

impl ProxyState {
    /// Apply an event, returning the next state
    ///
    /// Events that do not apply to the current state leave it unchanged.
    pub fn on_event(self, event: ProxyEvent) -> ProxyState {
        use ProxyEvent as E;
        use ProxyState as S;

        let next = match (self, event) {
            (S::Running, E::ControllerEof) => S::ControllerGone,
            (S::Running | S::ControllerGone, E::ChildOutputClosed) => {
                S::PeerGone(PeerCause::ChildClosed)
            }
            (S::Running | S::ControllerGone, E::DownstreamGone) => {
                S::PeerGone(PeerCause::DownstreamGone)
            }
            (S::Running | S::ControllerGone, E::ChildSignaled) => S::Signaled,
            (S::PeerGone(_) | S::Signaled, E::ShutdownComplete) => S::Done,
            (state, event) => {
                warn!(?state, ?event, "Ignoring event in current proxy state");
                return state;
            }
        };

        debug!(from = ?self, to = ?next, ?event, "Proxy state transition");
        next
    }

    /// Whether controller input is still being watched
    pub fn watches_controller(self) -> bool {
        self == ProxyState::Running
    }

    /// Whether the relay loop must stop
    pub fn is_terminal(self) -> bool {
        matches!(self, ProxyState::PeerGone(_) | ProxyState::Signaled)
    }

    pub fn terminal_reason(self) -> Option<TerminalReason> {
        match self {
            ProxyState::PeerGone(cause) => Some(TerminalReason::PeerGone(cause)),
            ProxyState::Signaled => Some(TerminalReason::ChildSignaled),
            _ => None,
        }
    }
}
