//! # Reactor: the readiness loop
//!
//! The reactor runs on a dedicated OS thread named `nodeio-reactor`. It:
//! 1. Waits on the poller for at most `reactor_timeout`
//! 2. Maps each event's token to its endpoint
//! 3. Listening socket: accepts one connection per notification
//! 4. Connection: drives the receive side (readable) or the flush side
//!    (writable) until it would block, tearing the connection down on any
//!    other error
//!
//! A poller failure other than `EINTR` stores the errno in the exit flag,
//! which stops the reactor and the workers.

use std::io;
use std::net::TcpListener;
use std::sync::Arc;

use nodeio_core::{NetError, Result};
use tracing::{debug, error, info, trace, warn};

use crate::context::{Endpoint, IoContext};
use crate::counters::bump;
use crate::poller::{Event, Events};
use crate::state::NetState;

pub(crate) fn reactor_loop(ctx: Arc<IoContext>) {
    let mut events = Events::with_capacity(ctx.config.max_events);
    info!(
        max_events = ctx.config.max_events,
        timeout = ?ctx.config.reactor_timeout,
        "reactor started"
    );

    while ctx.exit.is_running() {
        match ctx.poller.wait(&mut events, ctx.config.reactor_timeout) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                error!(%err, "poller wait failed, shutting down");
                ctx.exit.fail(-err.raw_os_error().unwrap_or(libc::EIO));
                break;
            }
        }

        for event in events.iter() {
            dispatch(&ctx, event);
        }
    }

    info!(status = ctx.exit.status(), "reactor exiting");
}

fn dispatch(ctx: &IoContext, event: Event) {
    match ctx.endpoint(event.token) {
        Some(Endpoint::Listening(listener)) => accept_one(ctx, &listener),
        Some(Endpoint::Established(conn)) => {
            if let Err(err) = drive(ctx, &conn, event) {
                if err.is_fatal_for_connection() {
                    debug!(token = conn.token(), %err, "closing connection");
                    ctx.close_connection(&conn);
                } else {
                    warn!(token = conn.token(), %err, "dropped partial request");
                }
            }
        }
        // Closed earlier in this batch.
        None => trace!(token = event.token, flags = event.flags(), "stale event"),
    }
}

/// Run the connection's handlers for `event` until each would block.
fn drive(ctx: &IoContext, conn: &Arc<NetState>, event: Event) -> Result<()> {
    if !event.is_readable() && !event.is_writable() {
        if event.is_error() {
            return Err(NetError::ConnectionReset);
        }
        return Ok(());
    }

    if event.is_readable() {
        until_blocked(|| {
            let req = conn.process_recv()?;
            trace!(token = conn.token(), trans = req.header().trans_id(), len = req.wire_len(), "request queued");
            ctx.inbound.push(req);
            Ok(())
        })?;
    }
    if event.is_writable() {
        until_blocked(|| conn.process_send())?;
    }
    Ok(())
}

fn until_blocked<F>(mut handler: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    loop {
        match handler() {
            Ok(()) => continue,
            Err(err) if err.is_transient() => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

/// One `accept` per notification; the poller is level-triggered, so a
/// backlog keeps the listener ready.
fn accept_one(ctx: &IoContext, listener: &TcpListener) {
    match listener.accept() {
        Ok((stream, peer)) => match ctx.add_connection(stream.into(), Some(peer)) {
            Ok(conn) => {
                bump(&ctx.counters.accepted, 1);
                info!(token = conn.token(), %peer, "accepted connection");
            }
            Err(err) => warn!(%peer, %err, "failed to register accepted connection"),
        },
        Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {}
        Err(err) => warn!(%err, "accept failed"),
    }
}
