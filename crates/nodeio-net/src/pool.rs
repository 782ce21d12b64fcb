//! Worker pool: fixed number of threads draining the inbound queue.
//!
//! Each worker pops one request, runs the processor with no lock held,
//! reports the command to the stats sink and drops the request, which
//! releases its connection reference. Panics in the processor or the sink
//! are caught per request.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use nodeio_core::{CommandStat, Disposition, NetError, Result};
use tracing::{debug, error, trace};

use crate::context::IoContext;
use crate::counters::bump;
use crate::request::Request;

pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.io_thread_num` workers.
    ///
    /// If any spawn fails, the exit flag is raised, the workers already
    /// started are joined, and the spawn error is returned.
    pub(crate) fn start(ctx: &Arc<IoContext>) -> Result<Self> {
        let count = ctx.config.io_thread_num;
        let mut handles = Vec::with_capacity(count);

        for idx in 0..count {
            let name = format!("nodeio-worker-{idx}");
            let worker_ctx = Arc::clone(ctx);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(worker_ctx, idx));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    error!(%name, %source, "failed to spawn worker");
                    ctx.exit.request();
                    join_all(handles);
                    return Err(NetError::Spawn { name, source });
                }
            }
        }

        debug!(count, "worker pool started");
        Ok(Self { handles })
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker. The exit flag must already be raised.
    pub(crate) fn join(self) {
        join_all(self.handles);
    }
}

fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("nodeio-worker").to_owned();
        if handle.join().is_err() {
            error!(%name, "worker panicked");
        }
    }
}

fn worker_loop(ctx: Arc<IoContext>, idx: usize) {
    debug!(idx, "worker started");
    while ctx.exit.is_running() {
        if let Some(req) = ctx.inbound.pop_timeout(ctx.config.worker_timeout) {
            process_one(&ctx, req);
        }
    }
    debug!(idx, "worker exiting");
}

/// Run one request through the processor and the sink. A panic in either
/// is logged and contained; the worker keeps draining the queue.
pub(crate) fn process_one(ctx: &IoContext, req: Request) {
    let header = *req.header();
    let token = req.conn().token();
    let start = Instant::now();
    let disposition = match catch_unwind(AssertUnwindSafe(|| {
        ctx.processor.process(req.conn(), &header, req.payload())
    })) {
        Ok(disposition) => disposition,
        Err(_) => {
            error!(token, trans = header.trans_id(), cmd = header.cmd, "processor panicked");
            Disposition::status(-libc::EIO)
        }
    };
    let elapsed = start.elapsed();

    trace!(
        token,
        trans = header.trans_id(),
        cmd = header.cmd,
        status = disposition.status,
        ?elapsed,
        "processed"
    );
    let stat = CommandStat {
        cmd: header.cmd,
        trans: header.trans_id(),
        err: disposition.status,
        cached: disposition.cached,
        size: header.size,
        elapsed,
    };
    if catch_unwind(AssertUnwindSafe(|| ctx.sink.command_counter(&stat))).is_err() {
        error!(token, trans = header.trans_id(), cmd = header.cmd, "stats sink panicked");
    }
    bump(&ctx.counters.requests_processed, 1);
    drop(req);
}
