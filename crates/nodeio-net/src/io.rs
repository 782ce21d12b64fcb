//! `IoSubsystem`: owner of the reactor, the worker pool and the poller.
//!
//! ```rust,ignore
//! let io = IoSubsystem::builder(processor)
//!     .config(IoConfig::from_env())
//!     .with_sink(Arc::new(MySink))
//!     .start()?;
//! io.listen(TcpListener::bind("0.0.0.0:1025")?)?;
//! // ...
//! io.shutdown();
//! ```
//!
//! Startup is staged: poller, reactor thread, then workers. A failure at any
//! stage raises the exit flag and joins whatever was already started before
//! the error is returned.
//!
//! Shutdown raises the exit flag, joins the reactor, joins the workers, tears
//! down every registered connection and frees whatever is still queued.
//! Threads notice the flag within one `reactor_timeout`/`worker_timeout`.

use std::net::TcpListener;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nodeio_core::{
    IoConfig, NetError, NoopSink, Processor, Result, SocketTuner, StatsSink,
};
use tracing::{error, info};

use crate::context::{Endpoint, IoContext};
use crate::counters::{bump, IoStats};
use crate::poller::{Poller, Token};
use crate::pool::WorkerPool;
use crate::reactor::reactor_loop;
use crate::state::NetState;
use crate::tune::DefaultTuner;

pub struct IoBuilder {
    config: IoConfig,
    processor: Arc<dyn Processor<NetState>>,
    sink: Arc<dyn StatsSink>,
    tuner: Option<Arc<dyn SocketTuner>>,
}

impl IoBuilder {
    pub fn config(mut self, config: IoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the default tuner built from the config.
    pub fn with_tuner(mut self, tuner: Arc<dyn SocketTuner>) -> Self {
        self.tuner = Some(tuner);
        self
    }

    pub fn start(self) -> Result<IoSubsystem> {
        self.config.validate()?;
        let tuner: Arc<dyn SocketTuner> = match self.tuner {
            Some(tuner) => tuner,
            None => Arc::new(DefaultTuner::from_config(&self.config)),
        };
        let poller = Poller::new()?;
        let ctx = Arc::new(IoContext::new(
            self.config,
            poller,
            self.processor,
            self.sink,
            tuner,
        ));

        let reactor_ctx = Arc::clone(&ctx);
        let reactor = thread::Builder::new()
            .name("nodeio-reactor".into())
            .spawn(move || reactor_loop(reactor_ctx))
            .map_err(|source| NetError::Spawn {
                name: "nodeio-reactor".into(),
                source,
            })?;

        let workers = match WorkerPool::start(&ctx) {
            Ok(workers) => workers,
            Err(err) => {
                ctx.exit.request();
                if reactor.join().is_err() {
                    error!("reactor panicked");
                }
                return Err(err);
            }
        };

        info!(workers = workers.len(), "I/O subsystem started");
        Ok(IoSubsystem {
            ctx,
            reactor: Some(reactor),
            workers: Some(workers),
        })
    }
}

pub struct IoSubsystem {
    ctx: Arc<IoContext>,
    reactor: Option<JoinHandle<()>>,
    workers: Option<WorkerPool>,
}

impl IoSubsystem {
    /// Builder with default config, no-op stats sink and default tuner.
    pub fn builder<P>(processor: P) -> IoBuilder
    where
        P: Processor<NetState> + 'static,
    {
        IoBuilder {
            config: IoConfig::default(),
            processor: Arc::new(processor),
            sink: Arc::new(NoopSink),
            tuner: None,
        }
    }

    /// Start with `config` and defaults for everything else.
    pub fn start<P>(config: IoConfig, processor: P) -> Result<Self>
    where
        P: Processor<NetState> + 'static,
    {
        Self::builder(processor).config(config).start()
    }

    /// Accept connections from `listener`.
    pub fn listen(&self, listener: TcpListener) -> Result<Token> {
        self.ctx.ensure_running()?;
        self.ctx.add_listener(listener)
    }

    /// Register an already-connected socket. It is tuned like an accepted one.
    pub fn attach<S: Into<OwnedFd>>(&self, socket: S) -> Result<Arc<NetState>> {
        self.ctx.ensure_running()?;
        let conn = self.ctx.add_connection(socket.into(), None)?;
        bump(&self.ctx.counters.attached, 1);
        Ok(conn)
    }

    pub fn stats(&self) -> IoStats {
        let mut stats = self.ctx.counters.snapshot();
        stats.inbound_depth = self.ctx.inbound.len();
        stats.endpoints = self.ctx.endpoint_count();
        stats
    }

    /// `0` running, `1` exit requested, negative errno if the reactor failed.
    pub fn exit_status(&self) -> i32 {
        self.ctx.exit.status()
    }

    pub fn is_running(&self) -> bool {
        self.ctx.exit.is_running()
    }

    /// Ask all threads to stop without waiting for them.
    pub fn request_exit(&self) {
        self.ctx.exit.request();
    }

    /// Stop and release everything. Returns the final exit status.
    pub fn shutdown(mut self) -> i32 {
        self.stop();
        self.ctx.exit.status()
    }

    fn stop(&mut self) {
        let Some(reactor) = self.reactor.take() else {
            return;
        };
        self.ctx.exit.request();
        if reactor.join().is_err() {
            error!("reactor panicked");
        }
        if let Some(workers) = self.workers.take() {
            workers.join();
        }

        let mut closed = 0usize;
        for endpoint in self.ctx.take_endpoints() {
            if let Endpoint::Established(conn) = endpoint {
                if conn.teardown() {
                    closed += 1;
                }
            }
        }
        let dropped = self.ctx.inbound.drain().len();

        info!(
            status = self.ctx.exit.status(),
            closed,
            dropped,
            "I/O subsystem stopped"
        );
    }
}

impl Drop for IoSubsystem {
    fn drop(&mut self) {
        self.stop();
    }
}
