//! nodeio echo node
//!
//! Every framed request is answered with a reply carrying the same
//! transaction id and payload. Prints an I/O statistics line periodically.
//!
//! Usage:
//!     cargo build --release -p nodeio-echo
//!     ./target/release/nodeio-echo [addr] [stats_interval_secs]
//!
//! Tuning comes from the environment (`NODEIO_IO_THREADS`,
//! `NODEIO_REACTOR_TIMEOUT_MS`, ...); log level from `RUST_LOG`.

use std::net::TcpListener;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nodeio_core::{CommandHeader, Disposition, IoConfig};
use nodeio_net::{IoSubsystem, NetState};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_signal(_: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

fn echo(conn: &Arc<NetState>, hdr: &CommandHeader, payload: &[u8]) -> Disposition {
    match conn.send_reply(hdr, 0, payload) {
        Ok(()) => Disposition::OK,
        Err(err) => {
            warn!(token = conn.token(), trans = hdr.trans_id(), %err, "reply dropped");
            Disposition::status(err.errno())
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let addr = args.get(1).map(String::as_str).unwrap_or("127.0.0.1:1025");
    let interval = Duration::from_secs(args.get(2).and_then(|s| s.parse().ok()).unwrap_or(5));

    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }

    let config = IoConfig::from_env();
    info!(?config, addr, "starting echo node");

    let io = match IoSubsystem::start(config, echo) {
        Ok(io) => io,
        Err(err) => {
            error!(%err, "failed to start I/O subsystem");
            return ExitCode::FAILURE;
        }
    };
    let listener = match TcpListener::bind(addr) {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr, %err, "bind failed");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = io.listen(listener) {
        error!(%err, "listen failed");
        return ExitCode::FAILURE;
    }

    let mut last = Instant::now();
    while RUNNING.load(Ordering::Relaxed) && io.is_running() {
        std::thread::sleep(Duration::from_millis(100));
        if last.elapsed() >= interval {
            info!(stats = %io.stats(), "io");
            last = Instant::now();
        }
    }

    let status = io.shutdown();
    if status < 0 {
        error!(status, "I/O subsystem failed");
        return ExitCode::FAILURE;
    }
    info!("bye");
    ExitCode::SUCCESS
}
