//! Linux host plumbing for pipesig
//!
//! Provides:
//! - Channel pair allocation (close-on-exec pipes)
//! - The signal gate: SIGCHLD blocked outside the wait, recorded by a flag
//! - Child spawning with rewired stdin/stdout
//! - Graceful (SIGTERM) and forceful (SIGKILL) termination
//! - Non-blocking exit observation

mod channel;
mod process;
mod signals;

pub use channel::*;
pub use process::*;
pub use signals::*;
