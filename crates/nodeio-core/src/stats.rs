//! Statistics sink abstraction.
//!
//! After every processed command the engine reports one [`CommandStat`].
//! Reporting is fire-and-forget: the sink returns nothing and the engine
//! never looks at what it did.

use std::time::Duration;

/// Counters for one processed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStat {
    /// Command number from the header.
    pub cmd: u32,
    /// Transaction id (reply bit masked).
    pub trans: u64,
    /// Status returned by the processor.
    pub err: i32,
    /// Whether a cache path served it.
    pub cached: bool,
    /// Payload bytes moved.
    pub size: u64,
    /// Time spent in the processor.
    pub elapsed: Duration,
}

/// Receives per-command counters.
///
/// **Contract:**
/// - `command_counter()` must NEVER block; it runs on a worker thread
///   right after processing.
pub trait StatsSink: Send + Sync {
    fn command_counter(&self, stat: &CommandStat);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl StatsSink for NoopSink {
    #[inline]
    fn command_counter(&self, _stat: &CommandStat) {}
}
