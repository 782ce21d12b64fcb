//! I/O queue statistics.
//!
//! Hot-path counters are relaxed atomics bumped by the reactor and workers;
//! [`IoStats`] is a point-in-time copy for the owner of the subsystem.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IoCounters {
    pub(crate) accepted: AtomicU64,
    pub(crate) attached: AtomicU64,
    pub(crate) released: AtomicU64,
    pub(crate) requests_received: AtomicU64,
    pub(crate) bytes_received: AtomicU64,
    pub(crate) requests_processed: AtomicU64,
    pub(crate) replies_queued: AtomicU64,
    pub(crate) bytes_sent: AtomicU64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl IoCounters {
    pub fn snapshot(&self) -> IoStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        IoStats {
            accepted: load(&self.accepted),
            attached: load(&self.attached),
            released: load(&self.released),
            requests_received: load(&self.requests_received),
            bytes_received: load(&self.bytes_received),
            requests_processed: load(&self.requests_processed),
            replies_queued: load(&self.replies_queued),
            bytes_sent: load(&self.bytes_sent),
            inbound_depth: 0,
            endpoints: 0,
        }
    }
}

/// Snapshot of the I/O subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    /// Connections accepted on listening sockets.
    pub accepted: u64,
    /// Connections attached by the owner (outbound connects).
    pub attached: u64,
    /// Connection states whose last reference was dropped.
    pub released: u64,
    /// Requests reassembled and queued.
    pub requests_received: u64,
    /// Bytes of reassembled requests, headers included.
    pub bytes_received: u64,
    /// Requests handed to the processor and freed.
    pub requests_processed: u64,
    /// Outbound items queued on connections.
    pub replies_queued: u64,
    /// Bytes written by the flush path.
    pub bytes_sent: u64,
    /// Requests waiting in the inbound queue.
    pub inbound_depth: usize,
    /// Listening sockets and connections registered with the reactor.
    pub endpoints: usize,
}

impl fmt::Display for IoStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "endpoints={} accepted={} attached={} released={} recv={} processed={} queued={} \
             bytes_in={} bytes_out={} inbound={}",
            self.endpoints,
            self.accepted,
            self.attached,
            self.released,
            self.requests_received,
            self.requests_processed,
            self.replies_queued,
            self.bytes_received,
            self.bytes_sent,
            self.inbound_depth,
        )
    }
}
