//! Linux `epoll` wrapper.
//!
//! A thin, reactor-private interface over `epoll_create1`/`epoll_ctl`/
//! `epoll_wait`. Descriptors are registered with `EPOLLEXCLUSIVE` so that
//! when several reactors watch overlapping descriptor sets, only one of them
//! is woken per ready event.

use crate::error::{Error, Result};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLEXCLUSIVE, EPOLLHUP,
    EPOLLIN, EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::RawFd;

/// Readiness interests for one registration.
#[derive(Clone, Copy, Debug)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub fn readable() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    pub fn writable() -> Self {
        Self {
            read: false,
            write: true,
        }
    }

    pub fn both() -> Self {
        Self {
            read: true,
            write: true,
        }
    }
}

/// A readiness report for one registered descriptor.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    pub fd: RawFd,

    pub readable: bool,
    pub writable: bool,

    /// The peer closed or the descriptor errored (`EPOLLHUP`/`EPOLLERR`).
    /// Such descriptors also report as readable so a read callback can
    /// observe the end-of-file.
    pub closed: bool,
}

pub(crate) struct Poller {
    epoll: RawFd,

    /// Reusable buffer for `epoll_wait` output.
    events: Vec<epoll_event>,
}

impl Poller {
    pub(crate) fn new() -> Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(Error::PollerCreate(io::Error::last_os_error()));
        }

        Ok(Self {
            epoll,
            events: Vec::with_capacity(64),
        })
    }

    pub(crate) fn add(&self, fd: RawFd, interest: Interest) -> Result<()> {
        // EPOLLEXCLUSIVE is only accepted at registration time.
        self.control(EPOLL_CTL_ADD, fd, flags_for(interest) | EPOLLEXCLUSIVE as u32)
    }

    pub(crate) fn modify(&self, fd: RawFd, interest: Interest) -> Result<()> {
        self.control(EPOLL_CTL_MOD, fd, flags_for(interest))
    }

    pub(crate) fn remove(&self, fd: RawFd) -> Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(Error::PollerControl {
                fd,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn control(&self, op: i32, fd: RawFd, flags: u32) -> Result<()> {
        let mut event = epoll_event {
            events: flags,
            u64: fd as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc != 0 {
            return Err(Error::PollerControl {
                fd,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Blocks for readiness, at most `timeout` milliseconds (`None` waits
    /// indefinitely). A signal-interrupted wait reports zero events rather
    /// than an error.
    pub(crate) fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<u64>) -> io::Result<()> {
        let timeout_ms = timeout
            .map(|ms| ms.min(i32::MAX as u64) as i32)
            .unwrap_or(-1);

        unsafe {
            self.events.set_len(self.events.capacity());
        }

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            unsafe {
                self.events.set_len(0);
            }
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        events.clear();

        for ev in &self.events {
            let fd = ev.u64 as RawFd;

            let readable = ev.events & ((EPOLLIN | EPOLLERR | EPOLLHUP) as u32) != 0;
            let writable = ev.events & (EPOLLOUT as u32) != 0;
            let closed = ev.events & ((EPOLLERR | EPOLLHUP) as u32) != 0;

            if let Some(e) = events.iter_mut().find(|e| e.fd == fd) {
                e.readable |= readable;
                e.writable |= writable;
                e.closed |= closed;
            } else {
                events.push(Event {
                    fd,
                    readable,
                    writable,
                    closed,
                });
            }
        }

        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}

fn flags_for(interest: Interest) -> u32 {
    let mut flags = 0;

    if interest.read {
        flags |= EPOLLIN;
    }
    if interest.write {
        flags |= EPOLLOUT;
    }

    flags as u32
}
