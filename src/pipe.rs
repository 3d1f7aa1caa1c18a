//! Self-pipe wake channel.
//!
//! A reactor blocks in `epoll_wait`; any thread interrupts that wait by
//! writing a byte into this pipe, whose readable end sits in the reactor's
//! interest set. Wake-ups are best-effort and idempotent: a full pipe already
//! guarantees a pending wake, so write errors are swallowed.
//!
//! Both ends are non-blocking and close-on-exec. If the readable end reports
//! a hard error the reactor tears the pipe down and recreates it through
//! [`Pipe::reset`]; the descriptors live in atomics so concurrent writers
//! always address the current pair.

use crate::error::{Error, Result};
use crate::fd;

use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};

/// Outcome of draining the readable end.
pub(crate) enum Drain {
    /// All pending wake bytes were consumed.
    Drained,
    /// The pipe reported end-of-file or a hard error and must be recreated.
    Broken,
}

pub(crate) struct Pipe {
    read_fd: AtomicI32,
    write_fd: AtomicI32,
}

impl Pipe {
    pub(crate) fn new() -> Result<Self> {
        let (read_fd, write_fd) = open_pair()?;
        Ok(Self {
            read_fd: AtomicI32::new(read_fd),
            write_fd: AtomicI32::new(write_fd),
        })
    }

    pub(crate) fn read_fd(&self) -> RawFd {
        self.read_fd.load(Ordering::Acquire)
    }

    /// Pushes one wake byte. Errors are deliberately ignored: `EAGAIN` means
    /// a wake is already pending, anything else is handled by the reader's
    /// self-heal path.
    pub(crate) fn notify(&self) {
        let fd = self.write_fd.load(Ordering::Acquire);
        if fd < 0 {
            return;
        }
        loop {
            let rc = unsafe { libc::write(fd, b"1".as_ptr() as *const _, 1) };
            if rc == -1 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                continue;
            }
            break;
        }
    }

    /// Drains every pending wake byte.
    ///
    /// Returns [`Drain::Broken`] on end-of-file or any error other than
    /// "would block", which is the signal to recreate the pipe.
    pub(crate) fn drain(&self) -> Drain {
        let fd = self.read_fd.load(Ordering::Acquire);
        if fd < 0 {
            return Drain::Broken;
        }

        let mut buffer = [0u8; 1024];
        loop {
            let rc = unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) };
            if rc > 0 {
                continue;
            }
            if rc == 0 {
                return Drain::Broken;
            }

            return match io::Error::last_os_error().kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => Drain::Drained,
                _ => Drain::Broken,
            };
        }
    }

    /// Closes both ends and opens a fresh pair.
    pub(crate) fn reset(&self) -> Result<()> {
        self.close();
        let (read_fd, write_fd) = open_pair()?;
        self.read_fd.store(read_fd, Ordering::Release);
        self.write_fd.store(write_fd, Ordering::Release);
        Ok(())
    }

    fn close(&self) {
        for end in [&self.read_fd, &self.write_fd] {
            let fd = end.swap(-1, Ordering::AcqRel);
            if fd >= 0 {
                unsafe { libc::close(fd) };
            }
        }
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_pair() -> Result<(RawFd, RawFd)> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(Error::PipeCreate(io::Error::last_os_error()));
    }

    for fd in fds {
        if let Err(e) = fd::set_non_blocking(fd).and_then(|_| fd::set_close_on_exec(fd)) {
            unsafe {
                libc::close(fds[0]);
                libc::close(fds[1]);
            }
            return Err(Error::PipeCreate(e));
        }
    }

    Ok((fds[0], fds[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_then_drain() {
        let pipe = Pipe::new().unwrap();

        pipe.notify();
        pipe.notify();
        pipe.notify();

        assert!(matches!(pipe.drain(), Drain::Drained));

        // Nothing pending: still just "drained", never a phantom wake byte.
        let mut buffer = [0u8; 8];
        let rc = unsafe { libc::read(pipe.read_fd(), buffer.as_mut_ptr() as *mut _, 8) };
        assert_eq!(rc, -1);
    }

    #[test]
    fn reset_replaces_descriptors() {
        let pipe = Pipe::new().unwrap();

        pipe.reset().unwrap();

        assert!(pipe.read_fd() >= 0);
        pipe.notify();
        assert!(matches!(pipe.drain(), Drain::Drained));
    }

    #[test]
    fn notify_is_best_effort_when_full() {
        let pipe = Pipe::new().unwrap();

        // A pipe holds 64 KiB by default; overfill it and keep going.
        for _ in 0..100_000 {
            pipe.notify();
        }

        assert!(matches!(pipe.drain(), Drain::Drained));
    }
}
