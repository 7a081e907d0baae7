//! Channel pair allocation

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::fs::File;
use std::os::fd::OwnedFd;
use tracing::debug;

use pipesig_util::{PipesigError, Result};

/// One unidirectional byte channel
#[derive(Debug)]
pub struct Channel {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl Channel {
    fn open() -> Result<Self> {
        // Close-on-exec so only the ends bound to the child's stdio survive exec
        let (read, write) = pipe2(OFlag::O_CLOEXEC).map_err(|e| PipesigError::setup("pipe", e))?;
        Ok(Self { read, write })
    }
}

/// The two channels connecting the supervisor and its child
///
/// `to_child` carries controller bytes into the child's stdin,
/// `from_child` carries the child's stdout back out.
#[derive(Debug)]
pub struct ChannelPair {
    pub to_child: Channel,
    pub from_child: Channel,
}

/// Ends retained by the supervisor
#[derive(Debug)]
pub struct ParentEnds {
    /// Write end feeding the child's stdin
    pub to_child: File,
    /// Read end draining the child's stdout
    pub from_child: File,
}

/// Ends handed to the child as its stdin and stdout
#[derive(Debug)]
pub struct ChildEnds {
    pub stdin: OwnedFd,
    pub stdout: OwnedFd,
}

impl ChannelPair {
    /// Allocate both channels
    pub fn allocate() -> Result<Self> {
        let to_child = Channel::open()?;
        let from_child = Channel::open()?;

        debug!(?to_child, ?from_child, "Channel pair allocated");

        Ok(Self {
            to_child,
            from_child,
        })
    }

    /// Split into the ends each side keeps
    ///
    /// Every descriptor ends up in exactly one of the two halves, so dropping
    /// a half releases that side's ends.
    pub fn split(self) -> (ParentEnds, ChildEnds) {
        let parent = ParentEnds {
            to_child: File::from(self.to_child.write),
            from_child: File::from(self.from_child.read),
        };
        let child = ChildEnds {
            stdin: self.to_child.read,
            stdout: self.from_child.write,
        };
        (parent, child)
    }
}
