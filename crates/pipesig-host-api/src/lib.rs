//! Host interfaces for pipesig
//!
//! This crate defines the seam between the proxy core and the
//! platform-specific process and signal plumbing. It contains no
//! process-creation or signal-installation code itself.

mod mock;
mod status;
mod traits;

pub use mock::*;
pub use status::*;
pub use traits::*;
