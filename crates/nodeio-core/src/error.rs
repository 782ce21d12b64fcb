//! nodeio error types.
//!
//! The engine sorts every failure into one of four buckets and reacts per
//! bucket, never per errno:
//!
//! | Bucket     | Variants                | Reactor reaction               |
//! |------------|-------------------------|--------------------------------|
//! | transient  | `WouldBlock`            | stop this descriptor, wait     |
//! | resource   | `Alloc`                 | reset framing, keep connection |
//! | connection | `ConnectionReset`, `Io` | tear the connection down       |
//! | subsystem  | `Spawn`, `Config`, `Stopped` | reported to the owner     |

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    /// No progress possible without blocking. `EAGAIN` and `EINTR` both map here.
    #[error("operation would block")]
    WouldBlock,
    /// Peer closed the connection, or the connection was already torn down.
    #[error("connection reset by peer")]
    ConnectionReset,
    /// Request buffer could not be allocated.
    #[error("failed to allocate {size} bytes for request")]
    Alloc { size: u64 },
    /// Any other socket or multiplexer failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Thread creation failed during startup.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    /// Configuration rejected by `IoConfig::validate`.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    /// The subsystem has been asked to exit.
    #[error("I/O subsystem is stopped")]
    Stopped,
}

impl NetError {
    /// Map a raw I/O error, folding `WouldBlock`/`Interrupted` into [`NetError::WouldBlock`].
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Self::WouldBlock,
            _ => Self::Io(err),
        }
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// Whether the reactor must tear the connection down after this error.
    #[inline]
    pub fn is_fatal_for_connection(&self) -> bool {
        !matches!(self, Self::WouldBlock | Self::Alloc { .. })
    }

    /// Negative errno, the convention used by status fields and the stats sink.
    pub fn errno(&self) -> i32 {
        match self {
            Self::WouldBlock => -libc_errno::EAGAIN,
            Self::ConnectionReset => -libc_errno::ECONNRESET,
            Self::Alloc { .. } => -libc_errno::ENOMEM,
            Self::Io(e) | Self::Spawn { source: e, .. } => {
                -e.raw_os_error().unwrap_or(libc_errno::EIO)
            }
            Self::Config(_) => -libc_errno::EINVAL,
            Self::Stopped => -libc_errno::ESHUTDOWN,
        }
    }
}

// Linux errno values; this crate stays free of libc.
mod libc_errno {
    pub const EIO: i32 = 5;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EINVAL: i32 = 22;
    pub const ECONNRESET: i32 = 104;
    pub const ESHUTDOWN: i32 = 108;
}

pub type Result<T> = std::result::Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_would_block_and_interrupted_are_transient() {
        let e = NetError::from_io(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(e.is_transient());
        let e = NetError::from_io(io::Error::from(io::ErrorKind::Interrupted));
        assert!(e.is_transient());
    }

    #[test]
    fn test_other_io_errors_are_fatal() {
        let e = NetError::from_io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(!e.is_transient());
        assert!(e.is_fatal_for_connection());
    }

    #[test]
    fn test_alloc_keeps_connection() {
        let e = NetError::Alloc { size: u64::MAX };
        assert!(!e.is_transient());
        assert!(!e.is_fatal_for_connection());
        assert_eq!(e.errno(), -12);
    }

    #[test]
    fn test_reset_errno() {
        assert_eq!(NetError::ConnectionReset.errno(), -104);
        assert!(NetError::ConnectionReset.is_fatal_for_connection());
    }

    #[test]
    fn test_io_errno_passthrough() {
        let e = NetError::Io(io::Error::from_raw_os_error(32));
        assert_eq!(e.errno(), -32);
    }
}
