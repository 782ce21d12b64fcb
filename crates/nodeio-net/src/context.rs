//! State shared by the reactor, the workers and the owning handle.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nodeio_core::{IoConfig, NetError, Processor, Result, SocketTuner, StatsSink};
use tracing::{debug, info};

use crate::counters::IoCounters;
use crate::poller::{Interest, Poller, Token};
use crate::queue::InboundQueue;
use crate::request::Request;
use crate::state::NetState;

/// Process-wide exit signal.
///
/// `0` running, `1` exit requested, negative errno when the reactor failed.
/// A failure status is never overwritten.
#[derive(Debug, Default)]
pub(crate) struct ExitFlag(AtomicI32);

pub(crate) const EXIT_RUNNING: i32 = 0;
pub(crate) const EXIT_REQUESTED: i32 = 1;

impl ExitFlag {
    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire) == EXIT_RUNNING
    }

    pub(crate) fn status(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn request(&self) {
        let _ = self.0.compare_exchange(
            EXIT_RUNNING,
            EXIT_REQUESTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn fail(&self, errno: i32) {
        let errno = if errno < 0 { errno } else { -libc::EIO };
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| (s >= 0).then_some(errno));
    }
}

/// What a multiplexer token refers to.
#[derive(Debug, Clone)]
pub(crate) enum Endpoint {
    Listening(Arc<TcpListener>),
    Established(Arc<NetState>),
}

pub(crate) struct IoContext {
    pub(crate) config: IoConfig,
    pub(crate) poller: Arc<Poller>,
    pub(crate) exit: ExitFlag,
    pub(crate) inbound: InboundQueue<Request>,
    pub(crate) counters: Arc<IoCounters>,
    pub(crate) processor: Arc<dyn Processor<NetState>>,
    pub(crate) sink: Arc<dyn StatsSink>,
    pub(crate) tuner: Arc<dyn SocketTuner>,
    endpoints: Mutex<HashMap<Token, Endpoint>>,
    next_token: AtomicU64,
}

impl IoContext {
    pub(crate) fn new(
        config: IoConfig,
        poller: Poller,
        processor: Arc<dyn Processor<NetState>>,
        sink: Arc<dyn StatsSink>,
        tuner: Arc<dyn SocketTuner>,
    ) -> Self {
        Self {
            config,
            poller: Arc::new(poller),
            exit: ExitFlag::default(),
            inbound: InboundQueue::new(),
            counters: Arc::new(IoCounters::default()),
            processor,
            sink,
            tuner,
            endpoints: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    fn endpoints(&self) -> MutexGuard<'_, HashMap<Token, Endpoint>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_token(&self) -> Token {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn endpoint(&self, token: Token) -> Option<Endpoint> {
        self.endpoints().get(&token).cloned()
    }

    pub(crate) fn endpoint_count(&self) -> usize {
        self.endpoints().len()
    }

    /// Register a non-blocking listening socket for accept readiness.
    pub(crate) fn add_listener(&self, listener: TcpListener) -> Result<Token> {
        listener.set_nonblocking(true)?;
        let token = self.next_token();
        let fd = listener.as_raw_fd();
        let addr = listener.local_addr().ok();
        self.endpoints()
            .insert(token, Endpoint::Listening(Arc::new(listener)));
        if let Err(err) = self.poller.add(fd, Interest::Read, token) {
            self.endpoints().remove(&token);
            return Err(err.into());
        }
        info!(token, addr = ?addr, "listening");
        Ok(token)
    }

    /// Tune `fd`, wrap it in a connection and register it for read readiness.
    pub(crate) fn add_connection(
        &self,
        fd: OwnedFd,
        peer: Option<SocketAddr>,
    ) -> Result<Arc<NetState>> {
        self.tuner.tune(fd.as_fd())?;
        let token = self.next_token();
        let conn = Arc::new(NetState::new(
            token,
            fd,
            peer,
            Arc::clone(&self.poller),
            Arc::clone(&self.counters),
        )?);

        // Visible in the registry before the first event can name it.
        self.endpoints()
            .insert(token, Endpoint::Established(Arc::clone(&conn)));
        if let Err(err) = conn.schedule_recv() {
            self.close_connection(&conn);
            return Err(err);
        }
        debug!(token, peer = ?peer, "connection registered");
        Ok(conn)
    }

    /// Tear `conn` down and drop the registration reference.
    pub(crate) fn close_connection(&self, conn: &NetState) {
        conn.teardown();
        self.endpoints().remove(&conn.token());
    }

    /// Empty the registry. Used once all threads have been joined.
    pub(crate) fn take_endpoints(&self) -> Vec<Endpoint> {
        self.endpoints().drain().map(|(_, ep)| ep).collect()
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.exit.is_running() {
            Ok(())
        } else {
            Err(NetError::Stopped)
        }
    }
}
