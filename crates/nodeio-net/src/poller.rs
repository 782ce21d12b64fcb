//! `Poller`: epoll readiness multiplexer.
//!
//! Level-triggered. Each registration carries a [`Token`] that the reactor
//! maps back to an endpoint. A connection registers its read descriptor for
//! [`Interest::Read`] for its whole life, and its (separate) write
//! descriptor for [`Interest::Write`] only while its outbound queue is
//! non-empty.
//!
//! `add` and `delete` are idempotent: `EEXIST` on add and `ENOENT` on
//! delete are success. Enqueue (worker thread) and flush (reactor thread)
//! race on write interest, and both orders must be harmless.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use tracing::trace;

/// Registration key handed back with every readiness event.
pub type Token = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

impl Interest {
    #[inline]
    fn mask(self) -> u32 {
        match self {
            Interest::Read => libc::EPOLLIN as u32,
            Interest::Write => libc::EPOLLOUT as u32,
        }
    }
}

/// One readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: Token,
    flags: u32,
}

impl Event {
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.flags & libc::EPOLLIN as u32 != 0
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.flags & libc::EPOLLOUT as u32 != 0
    }

    /// `EPOLLHUP` or `EPOLLERR`.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.flags & (libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }
}

/// Event buffer filled by [`Poller::wait`].
pub struct Events {
    buf: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: vec![libc::epoll_event { events: 0, u64: 0 }; cap.max(1)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.buf[..self.len].iter().map(|ev| Event {
            token: ev.u64,
            flags: ev.events,
        })
    }
}

/// Owned epoll instance. Closed on drop.
#[derive(Debug)]
pub struct Poller {
    epfd: OwnedFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // Safety: epoll_create1 just returned this descriptor to us.
        let epfd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { epfd })
    }

    /// Register `fd` for `interest`. Already registered is success.
    pub fn add(&self, fd: RawFd, interest: Interest, token: Token) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events: interest.mask(),
            u64: token,
        };
        let ret = unsafe {
            libc::epoll_ctl(self.epfd.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut ev)
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                trace!(fd, token, ?interest, "already registered");
                return Ok(());
            }
            return Err(err);
        }
        trace!(fd, token, ?interest, "registered");
        Ok(())
    }

    /// Deregister `fd`. Not registered is success.
    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        // Pre-2.6.9 kernels require a non-null event for EPOLL_CTL_DEL.
        let mut ev = libc::epoll_event { events: 0, u64: 0 };
        let ret = unsafe {
            libc::epoll_ctl(self.epfd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, &mut ev)
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(());
            }
            return Err(err);
        }
        trace!(fd, "deregistered");
        Ok(())
    }

    /// Wait up to `timeout` for readiness. Returns the number of events.
    pub fn wait(&self, events: &mut Events, timeout: Duration) -> io::Result<usize> {
        let ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let max = events.buf.len().min(libc::c_int::MAX as usize) as libc::c_int;
        let n = unsafe {
            libc::epoll_wait(self.epfd.as_raw_fd(), events.buf.as_mut_ptr(), max, ms)
        };
        if n < 0 {
            events.len = 0;
            return Err(io::Error::last_os_error());
        }
        events.len = n as usize;
        Ok(events.len)
    }
}

impl AsRawFd for Poller {
    fn as_raw_fd(&self) -> RawFd {
        self.epfd.as_raw_fd()
    }
}
