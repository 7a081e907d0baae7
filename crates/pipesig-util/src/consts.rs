//! Status and sizing constants

/// Status reported when no child exit status could be captured, and for
/// every fatal setup or relay failure.
pub const FAILURE_STATUS: i32 = -1;

/// Default capacity of the relay buffer in bytes.
pub const DEFAULT_RELAY_CAPACITY: usize = 8192;
