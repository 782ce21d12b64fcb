//! Socket tuning abstraction.
//!
//! Applied once to every socket before it is registered with the reactor,
//! whether it came from `accept` or was connected elsewhere and attached.

use std::io;
use std::os::fd::BorrowedFd;

/// Applies non-blocking mode and socket options to a fresh descriptor.
///
/// **Contract:**
/// - On return `Ok(())` the descriptor MUST be non-blocking.
/// - Option failures that do not affect correctness should be swallowed.
pub trait SocketTuner: Send + Sync {
    fn tune(&self, fd: BorrowedFd<'_>) -> io::Result<()>;
}
