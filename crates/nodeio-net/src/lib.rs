//! # nodeio-net
//!
//! Network I/O engine of a storage node: one epoll reactor thread, a fixed
//! worker pool, and reference-counted connections.
//!
//! ```text
//!  socket ──readable──▶ Reactor ──RecvState──▶ Request ──▶ InboundQueue
//!                          ▲                                    │
//!                          │ writable                           ▼
//!  socket ◀──flush── NetState send queue ◀──enqueue── Worker (Processor)
//! ```
//!
//! - [`poller`]: epoll wrapper with idempotent add/delete
//! - [`framing`]: header-then-body receive state machine
//! - [`state`]: per-connection state, send queue and teardown
//! - [`queue`]: mutex + condvar inbound FIFO
//! - [`io`]: subsystem startup, shutdown and statistics
//!
//! Linux only.

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod counters;
        pub mod framing;
        pub mod io;
        pub mod poller;
        pub mod queue;
        pub mod request;
        pub mod socket;
        pub mod state;
        pub mod tune;

        mod context;
        mod pool;
        mod reactor;

        pub use counters::IoStats;
        pub use framing::{Frame, Phase, RecvState};
        pub use io::{IoBuilder, IoSubsystem};
        pub use poller::Token;
        pub use request::{Outbound, Request};
        pub use state::NetState;
        pub use tune::DefaultTuner;
    } else {
        compile_error!("nodeio-net requires Linux (epoll)");
    }
}
