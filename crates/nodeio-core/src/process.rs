//! Command processing abstraction.
//!
//! A `Processor` is the command interpreter sitting on top of the engine:
//! it turns one fully reassembled request into storage operations and,
//! usually, queues a reply on the connection it came from.
//!
//! The trait is generic over the connection handle so this crate does not
//! depend on the engine; `nodeio-net` binds `C = NetState`.

use std::sync::Arc;

use crate::header::CommandHeader;

/// Outcome of processing one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disposition {
    /// Status code (0 or negative errno).
    pub status: i32,
    /// Whether a cache path served the command.
    pub cached: bool,
}

impl Disposition {
    pub const OK: Self = Self { status: 0, cached: false };

    pub fn status(status: i32) -> Self {
        Self { status, cached: false }
    }

    pub fn cached(status: i32) -> Self {
        Self { status, cached: true }
    }
}

/// Processes completed requests on a worker thread.
///
/// **Contract:**
/// - Called with no engine locks held.
/// - May enqueue replies on `conn`.
/// - Must not block for unbounded time: it occupies one worker.
/// - Two requests from the same connection may be processed concurrently
///   on different workers; replies are matched by transaction id.
pub trait Processor<C>: Send + Sync {
    fn process(&self, conn: &Arc<C>, header: &CommandHeader, payload: &[u8]) -> Disposition;
}

impl<C, F> Processor<C> for F
where
    F: Fn(&Arc<C>, &CommandHeader, &[u8]) -> Disposition + Send + Sync,
{
    fn process(&self, conn: &Arc<C>, header: &CommandHeader, payload: &[u8]) -> Disposition {
        self(conn, header, payload)
    }
}
