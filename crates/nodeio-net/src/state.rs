//! `NetState`: one peer connection.
//!
//! Ownership is `Arc<NetState>`. The endpoint registry holds one reference
//! for as long as the connection is registered, and every inbound
//! [`Request`] holds one more. The sockets close when the last reference
//! drops, so release happens exactly once and never while a worker still
//! uses the connection.
//!
//! Receive-side framing is mutated only by the reactor thread and lives in a
//! [`ReactorCell`]. The outbound queue is shared with workers and sits
//! behind its own mutex.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nodeio_core::{CommandHeader, NetError, Result};
use tracing::{debug, trace, warn};

use crate::counters::{bump, IoCounters};
use crate::framing::RecvState;
use crate::poller::{Interest, Poller, Token};
use crate::request::{Outbound, Request};
use crate::socket::Socket;

/// Cell written by exactly one thread at a time.
///
/// # Safety contract
///
/// Callers of [`ReactorCell::get_mut`] guarantee no other reference into the
/// cell is live. In this crate that is the reactor thread while it runs, and
/// the shutdown path after the reactor has been joined.
pub(crate) struct ReactorCell<T>(UnsafeCell<T>);

// Safety: access is serialized by the single-writer contract above.
unsafe impl<T: Send> Sync for ReactorCell<T> {}

impl<T> ReactorCell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    ///
    /// No other reference into the cell may exist for the returned lifetime.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get_mut(&self) -> &mut T {
        &mut *self.0.get()
    }
}

pub struct NetState {
    token: Token,
    peer: Option<SocketAddr>,
    read: Socket,
    write: Socket,
    recv: ReactorCell<RecvState>,
    send_queue: Mutex<VecDeque<Outbound>>,
    closed: AtomicBool,
    poller: Arc<Poller>,
    counters: Arc<IoCounters>,
}

impl NetState {
    /// Wrap `fd` (already non-blocking). The write side is a `dup` of it.
    pub(crate) fn new(
        token: Token,
        fd: OwnedFd,
        peer: Option<SocketAddr>,
        poller: Arc<Poller>,
        counters: Arc<IoCounters>,
    ) -> Result<Self> {
        let read = Socket::new(fd);
        let write = read.try_clone()?;
        Ok(Self {
            token,
            peer,
            read,
            write,
            recv: ReactorCell::new(RecvState::new()),
            send_queue: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            poller,
            counters,
        })
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Torn down; no further sends will be accepted.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Outbound items not yet fully written.
    pub fn pending_sends(&self) -> usize {
        self.queue().len()
    }

    /// Queue `item` for sending. The first item on an empty queue arms write interest.
    pub fn enqueue(&self, item: Outbound) -> Result<()> {
        let mut queue = self.queue();
        if self.is_closed() {
            return Err(NetError::ConnectionReset);
        }
        let was_empty = queue.is_empty();
        let len = item.len();
        queue.push_back(item);
        if was_empty {
            if let Err(err) = self.schedule_send() {
                queue.pop_back();
                return Err(err);
            }
        }
        bump(&self.counters.replies_queued, 1);
        trace!(token = self.token, len, depth = queue.len(), "queued outbound");
        Ok(())
    }

    /// Queue a reply to `req` carrying `status` and `payload`.
    pub fn send_reply(&self, req: &CommandHeader, status: i32, payload: &[u8]) -> Result<()> {
        self.enqueue(Outbound::reply(req, status, payload))
    }

    pub(crate) fn schedule_recv(&self) -> Result<()> {
        self.poller
            .add(self.read.as_raw_fd(), Interest::Read, self.token)
            .map_err(NetError::Io)
    }

    pub(crate) fn schedule_send(&self) -> Result<()> {
        self.poller
            .add(self.write.as_raw_fd(), Interest::Write, self.token)
            .map_err(NetError::Io)
    }

    pub(crate) fn unschedule_send(&self) -> Result<()> {
        self.poller.delete(self.write.as_raw_fd()).map_err(NetError::Io)
    }

    /// Reassemble the next message. Reactor thread only.
    pub(crate) fn process_recv(self: &Arc<Self>) -> Result<Request> {
        // Safety: only the reactor thread drives the receive side.
        let recv = unsafe { self.recv.get_mut() };
        let frame = recv.advance(&self.read)?;
        bump(&self.counters.requests_received, 1);
        bump(&self.counters.bytes_received, frame.buf.len() as u64);
        Ok(Request::new(Arc::clone(self), frame))
    }

    #[cfg(test)]
    pub(crate) fn recv_phase(&self) -> crate::framing::Phase {
        // Safety: as for `process_recv`.
        unsafe { self.recv.get_mut() }.phase()
    }

    /// Write queued items until the queue drains or the socket fills.
    ///
    /// Always ends in an error: `WouldBlock` when there is nothing more to do
    /// now, anything else when the connection must be torn down.
    pub(crate) fn process_send(&self) -> Result<()> {
        loop {
            let mut queue = self.queue();
            let Some(head) = queue.front_mut() else {
                self.unschedule_send()?;
                return Err(NetError::WouldBlock);
            };
            let n = head.write_to(&self.write)?;
            bump(&self.counters.bytes_sent, n as u64);
            if !head.is_complete() {
                trace!(token = self.token, sent = head.sent(), len = head.len(), "partial send");
                return Err(NetError::WouldBlock);
            }
            queue.pop_front();
        }
    }

    /// Stop the connection: drop queued sends, deregister both descriptors
    /// and discard any partial message. Returns `false` if already torn down.
    ///
    /// Reactor thread only, or after the reactor has been joined.
    pub(crate) fn teardown(&self) -> bool {
        let mut queue = self.queue();
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let dropped = queue.len();
        queue.clear();
        drop(queue);

        for fd in [self.read.as_raw_fd(), self.write.as_raw_fd()] {
            if let Err(err) = self.poller.delete(fd) {
                warn!(token = self.token, fd, %err, "failed to deregister");
            }
        }
        // Safety: see the doc comment above.
        unsafe { self.recv.get_mut() }.reset();

        debug!(token = self.token, peer = ?self.peer, dropped, "connection torn down");
        true
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Outbound>> {
        self.send_queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for NetState {
    fn drop(&mut self) {
        bump(&self.counters.released, 1);
        debug!(token = self.token, peer = ?self.peer, "connection released");
    }
}

impl fmt::Debug for NetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetState")
            .field("token", &self.token)
            .field("peer", &self.peer)
            .field("read_fd", &self.read.as_raw_fd())
            .field("write_fd", &self.write.as_raw_fd())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::Phase;
    use crate::poller::Events;
    use nodeio_core::HEADER_SIZE;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn conn_pair() -> (Arc<NetState>, UnixStream, Arc<Poller>, Arc<IoCounters>) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let poller = Arc::new(Poller::new().unwrap());
        let counters = Arc::new(IoCounters::default());
        let conn =
            NetState::new(9, a.into(), None, Arc::clone(&poller), Arc::clone(&counters)).unwrap();
        (Arc::new(conn), b, poller, counters)
    }

    fn writable_events(poller: &Poller) -> usize {
        let mut events = Events::with_capacity(8);
        poller.wait(&mut events, Duration::from_millis(20)).unwrap();
        events.iter().filter(|ev| ev.is_writable()).count()
    }

    #[test]
    fn test_enqueue_arms_write_interest_once() {
        let (conn, _peer, poller, counters) = conn_pair();
        let hdr = CommandHeader::request(1, 1, 0);

        conn.enqueue(Outbound::new(&hdr, b"a")).unwrap();
        conn.enqueue(Outbound::new(&hdr, b"b")).unwrap();
        assert_eq!(conn.pending_sends(), 2);
        assert_eq!(writable_events(&poller), 1);
        assert_eq!(counters.snapshot().replies_queued, 2);

        // schedule/unschedule are idempotent
        conn.schedule_send().unwrap();
        conn.unschedule_send().unwrap();
        conn.unschedule_send().unwrap();
        assert_eq!(writable_events(&poller), 0);
    }

    #[test]
    fn test_process_send_drains_and_disarms() {
        let (conn, mut peer, poller, counters) = conn_pair();
        conn.send_reply(&CommandHeader::request(3, 4, 0), 0, b"hello").unwrap();
        conn.send_reply(&CommandHeader::request(3, 5, 0), 0, b"").unwrap();

        assert!(matches!(conn.process_send(), Err(NetError::WouldBlock)));
        assert_eq!(conn.pending_sends(), 0);
        assert_eq!(writable_events(&poller), 0);

        let total = 2 * HEADER_SIZE + 5;
        let mut buf = vec![0u8; total];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[HEADER_SIZE..HEADER_SIZE + 5], b"hello");
        assert_eq!(counters.snapshot().bytes_sent, total as u64);
    }

    #[test]
    fn test_process_recv_builds_request() {
        let (conn, mut peer, _poller, counters) = conn_pair();
        let hdr = CommandHeader::request(7, 42, 3);
        peer.write_all(&hdr.to_wire()).unwrap();
        peer.write_all(b"xyz").unwrap();

        let req = conn.process_recv().unwrap();
        assert_eq!(req.header().trans_id(), 42);
        assert_eq!(req.payload(), b"xyz");
        assert_eq!(req.wire_len(), HEADER_SIZE + 3);
        assert!(req.has_payload());
        assert_eq!(Arc::strong_count(&conn), 2);
        assert!(matches!(conn.process_recv(), Err(NetError::WouldBlock)));
        assert_eq!(conn.recv_phase(), Phase::AwaitingHeader);

        drop(req);
        assert_eq!(Arc::strong_count(&conn), 1);
        assert_eq!(counters.snapshot().requests_received, 1);
    }

    #[test]
    fn test_header_only_request_has_no_payload() {
        let (conn, mut peer, _poller, _counters) = conn_pair();
        peer.write_all(&CommandHeader::request(3, 5, 0).to_wire()).unwrap();

        let req = conn.process_recv().unwrap();
        assert_eq!(req.wire_len(), HEADER_SIZE);
        assert!(!req.has_payload());
        assert!(req.payload().is_empty());
    }

    #[test]
    fn test_teardown_is_idempotent_and_rejects_sends() {
        let (conn, _peer, poller, counters) = conn_pair();
        conn.schedule_recv().unwrap();
        conn.enqueue(Outbound::new(&CommandHeader::default(), b"x")).unwrap();

        assert!(conn.teardown());
        assert!(!conn.teardown());
        assert!(conn.is_closed());
        assert_eq!(conn.pending_sends(), 0);
        assert_eq!(writable_events(&poller), 0);
        assert!(matches!(
            conn.send_reply(&CommandHeader::default(), 0, b""),
            Err(NetError::ConnectionReset)
        ));

        assert_eq!(counters.snapshot().released, 0);
        drop(conn);
        assert_eq!(counters.snapshot().released, 1);
    }

    #[test]
    fn test_sends_racing_teardown_leave_nothing_queued() {
        let (conn, _peer, _poller, counters) = conn_pair();
        let start = Arc::new(std::sync::Barrier::new(5));

        let senders: Vec<_> = (0..4u64)
            .map(|i| {
                let conn = Arc::clone(&conn);
                let start = Arc::clone(&start);
                std::thread::spawn(move || {
                    let hdr = CommandHeader::request(1, i, 0);
                    start.wait();
                    loop {
                        let closed_before = conn.is_closed();
                        match conn.send_reply(&hdr, 0, b"reply") {
                            Ok(()) => assert!(!closed_before, "send accepted after teardown"),
                            Err(NetError::ConnectionReset) => break,
                            Err(e) => panic!("unexpected error {e}"),
                        }
                    }
                    assert!(matches!(
                        conn.send_reply(&hdr, 0, b""),
                        Err(NetError::ConnectionReset)
                    ));
                    conn
                })
            })
            .collect();

        start.wait();
        std::thread::sleep(Duration::from_millis(20));
        assert!(conn.teardown());
        drop(conn);

        let clones: Vec<_> = senders.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(clones[0].pending_sends(), 0);
        assert_eq!(counters.snapshot().released, 0);
        drop(clones);
        assert_eq!(counters.snapshot().released, 1);
    }
}
