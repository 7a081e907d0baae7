//! Shared utilities for pipesig
//!
//! This crate provides:
//! - The error type shared by the core and the binary
//! - Status and sizing constants

mod consts;
mod error;

pub use consts::*;
pub use error::*;
