//! Default socket tuning.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nodeio_core::{IoConfig, SocketTuner};
use tracing::trace;

/// Sets `O_NONBLOCK`, then `TCP_NODELAY` and `SO_KEEPALIVE` when enabled.
///
/// Option failures are ignored: Unix-domain sockets reject `TCP_NODELAY`
/// and the connection works without it.
#[derive(Debug, Clone, Copy)]
pub struct DefaultTuner {
    pub nodelay: bool,
    pub keepalive: bool,
}

impl Default for DefaultTuner {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: true,
        }
    }
}

impl DefaultTuner {
    pub fn from_config(config: &IoConfig) -> Self {
        Self {
            nodelay: config.tcp_nodelay,
            keepalive: config.keepalive,
        }
    }
}

impl SocketTuner for DefaultTuner {
    fn tune(&self, fd: BorrowedFd<'_>) -> io::Result<()> {
        let raw = fd.as_raw_fd();
        set_nonblocking(raw)?;
        if self.nodelay {
            set_flag(raw, libc::IPPROTO_TCP, libc::TCP_NODELAY, "TCP_NODELAY");
        }
        if self.keepalive {
            set_flag(raw, libc::SOL_SOCKET, libc::SO_KEEPALIVE, "SO_KEEPALIVE");
        }
        Ok(())
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

fn set_flag(fd: RawFd, level: libc::c_int, name: libc::c_int, label: &'static str) {
    let opt: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &opt as *const _ as *const libc::c_void,
            std::mem::size_of_val(&opt) as libc::socklen_t,
        )
    };
    if ret != 0 {
        trace!(fd, option = label, err = %io::Error::last_os_error(), "socket option not applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    fn is_nonblocking(fd: RawFd) -> bool {
        let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL).unwrap());
        flags.contains(OFlag::O_NONBLOCK)
    }

    fn get_flag(fd: RawFd, level: libc::c_int, name: libc::c_int) -> libc::c_int {
        let mut opt: libc::c_int = 0;
        let mut len = std::mem::size_of_val(&opt) as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(fd, level, name, &mut opt as *mut _ as *mut libc::c_void, &mut len)
        };
        assert_eq!(ret, 0);
        opt
    }

    #[test]
    fn test_unix_socket_becomes_nonblocking() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(!is_nonblocking(a.as_raw_fd()));
        DefaultTuner::default().tune(a.as_fd()).unwrap();
        assert!(is_nonblocking(a.as_raw_fd()));
    }

    #[test]
    fn test_tcp_options_applied() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        DefaultTuner::default().tune(stream.as_fd()).unwrap();

        let fd = stream.as_raw_fd();
        assert!(is_nonblocking(fd));
        assert_ne!(get_flag(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY), 0);
        assert_ne!(get_flag(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE), 0);
    }

    #[test]
    fn test_from_config() {
        let tuner = DefaultTuner::from_config(&IoConfig::default().tcp_nodelay(false));
        assert!(!tuner.nodelay);
        assert!(tuner.keepalive);
    }
}
