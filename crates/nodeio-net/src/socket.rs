//! Thin owned socket for non-blocking `recv`/`send`.
//!
//! `&Socket` implements [`Read`] and [`Write`] so the framing and flush
//! code can be written against the std traits and tested with in-memory
//! readers/writers.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

#[derive(Debug)]
pub struct Socket {
    fd: OwnedFd,
}

impl Socket {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// `dup` the descriptor (close-on-exec).
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            fd: self.fd.try_clone()?,
        })
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }

    /// `send` with `MSG_NOSIGNAL`: a closed peer yields `EPIPE`, not `SIGPIPE`.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let ret = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }
}

impl Read for &Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

impl Write for &Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for Socket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl From<OwnedFd> for Socket {
    fn from(fd: OwnedFd) -> Self {
        Self::new(fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_recv_send_roundtrip_through_clone() {
        let (a, b) = UnixStream::pair().unwrap();
        let a = Socket::new(a.into());
        let a_dup = a.try_clone().unwrap();
        assert_ne!(a.as_raw_fd(), a_dup.as_raw_fd());

        let b = Socket::new(b.into());
        assert_eq!(a_dup.send(b"ping").unwrap(), 4);
        let mut buf = [0u8; 8];
        assert_eq!(b.recv(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");
    }

    #[test]
    fn test_nonblocking_recv_would_block() {
        let (a, _b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let a = Socket::new(a.into());
        let mut buf = [0u8; 8];
        let err = a.recv(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_send_to_closed_peer_is_error_not_signal() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let a = Socket::new(a.into());
        assert!(a.send(b"x").is_err());
    }

    #[test]
    fn test_recv_eof() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let a = Socket::new(a.into());
        let mut buf = [0u8; 8];
        assert_eq!(a.recv(&mut buf).unwrap(), 0);
    }
}
