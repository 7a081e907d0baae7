//! Error types for pipesig

use nix::errno::Errno;
use thiserror::Error;

/// Core error type for pipesig operations
///
/// Every variant is fatal to the supervisor: the caller logs it and exits
/// with [`crate::FAILURE_STATUS`].
#[derive(Debug, Error)]
pub enum PipesigError {
    /// A setup step (channel allocation, signal masking, handler
    /// installation, process creation) failed.
    #[error("{op}: {source}")]
    Setup {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A read or write on one of the relayed streams failed.
    #[error("{op}: {source}")]
    Relay {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The multiplexed wait failed with something other than EINTR.
    #[error("{op}: {source}")]
    Wait {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("Host error: {0}")]
    HostError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipesigError {
    pub fn setup(op: &'static str, source: Errno) -> Self {
        Self::Setup {
            op,
            source: source.into(),
        }
    }

    /// Setup failure reported through `std::io`, as process creation is
    pub fn setup_io(op: &'static str, source: std::io::Error) -> Self {
        Self::Setup { op, source }
    }

    pub fn relay(op: &'static str, source: std::io::Error) -> Self {
        Self::Relay { op, source }
    }

    pub fn wait(op: &'static str, source: Errno) -> Self {
        Self::Wait { op, source }
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::HostError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Name of the failing operation, when the error carries one
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Setup { op, .. } | Self::Relay { op, .. } | Self::Wait { op, .. } => Some(op),
            Self::HostError(_) | Self::ConfigError(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipesigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_operation() {
        let err = PipesigError::setup("sigprocmask", Errno::EINVAL);
        assert!(err.to_string().starts_with("sigprocmask: "));
        assert_eq!(err.operation(), Some("sigprocmask"));
    }

    #[test]
    fn setup_keeps_errno_and_io_sources() {
        let err = PipesigError::setup("pipe", Errno::EMFILE);
        let source = std::error::Error::source(&err).unwrap();
        let io = source.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.raw_os_error(), Some(Errno::EMFILE as i32));

        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        let err = PipesigError::setup_io("fork", missing);
        assert!(matches!(err, PipesigError::Setup { op: "fork", .. }));
        assert!(err.to_string().starts_with("fork: "));
    }

    #[test]
    fn relay_error_keeps_io_source() {
        let io = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        let err = PipesigError::relay("write", io);
        assert_eq!(err.operation(), Some("write"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn string_variants_have_no_operation() {
        assert_eq!(PipesigError::host("gone").operation(), None);
        assert_eq!(
            PipesigError::config("bad").to_string(),
            "Configuration error: bad"
        );
    }
}
