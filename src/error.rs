//! Crate-wide error type.
//!
//! Configuration mistakes (a negative descriptor, a zero delay) are rejected
//! synchronously before any state is touched. OS resource failures carry the
//! underlying `io::Error` so the errno and its description travel together.

use std::io;
use std::os::fd::RawFd;

use thiserror::Error;

/// Errors produced by the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller handed in a descriptor that cannot be registered.
    #[error("invalid file descriptor: {0}")]
    InvalidFd(RawFd),

    /// `epoll_create1(2)` failed; the reactor thread cannot start.
    #[error("epoll create failed: {0}")]
    PollerCreate(#[source] io::Error),

    /// An `epoll_ctl(2)` add/modify/delete failed for one descriptor.
    #[error("epoll control failed for fd {fd}: {source}")]
    PollerControl {
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    /// The wake pipe could not be created or configured.
    #[error("wake pipe create failed: {0}")]
    PipeCreate(#[source] io::Error),

    /// The OS refused to spawn the thread backing a reactor or worker.
    #[error("failed to spawn thread {name}: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The target loop has already stopped.
    #[error("the owning loop is not running")]
    NotRunning,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
