//! Descriptor-option helpers.
//!
//! The runtime only ever needs two descriptor properties: non-blocking mode,
//! so loop threads never stall inside `read(2)`/`write(2)`, and close-on-exec,
//! so loop-internal descriptors are not inherited by child processes. Both
//! helpers are public so an I/O layer built on [`Reactor::add_event`] can
//! prepare its own descriptors the same way.
//!
//! [`Reactor::add_event`]: crate::reactor::Reactor::add_event

use libc::{F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, O_NONBLOCK, fcntl};
use std::io;
use std::os::fd::RawFd;

/// Puts the descriptor into non-blocking mode.
pub fn set_non_blocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Marks the descriptor close-on-exec.
pub fn set_close_on_exec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFD, flags | FD_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_closed_descriptor() {
        assert!(set_non_blocking(-1).is_err());
        assert!(set_close_on_exec(-1).is_err());
    }

    #[test]
    fn flags_stick() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);

        set_non_blocking(fds[0]).unwrap();
        set_close_on_exec(fds[0]).unwrap();

        let fl = unsafe { fcntl(fds[0], F_GETFL) };
        assert_ne!(fl & O_NONBLOCK, 0, "O_NONBLOCK should be set");

        let fdfl = unsafe { fcntl(fds[0], F_GETFD) };
        assert_ne!(fdfl & FD_CLOEXEC, 0, "FD_CLOEXEC should be set");

        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
