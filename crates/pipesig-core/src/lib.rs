//! Proxy engine for pipesig
//!
//! This crate is the heart of pipesig, containing:
//! - The proxy state machine (Running -> ControllerGone -> PeerGone/Signaled -> Done)
//! - The relay loop multiplexing controller input and child output
//! - The shutdown sequence that reaps and kills the child

mod proxy;
mod shutdown;
mod state;

pub use proxy::*;
pub use shutdown::*;
pub use state::*;
