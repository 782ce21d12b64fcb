//! # nodeio-core: Types and interface traits for nodeio
//!
//! This crate holds everything the network engine shares with the code
//! around it, and nothing that owns a thread or a socket:
//!
//! - [`header`]: the fixed-size command header that frames every message,
//!   and its wire/host conversion.
//! - [`error`]: the error taxonomy (transient, peer-closed, fatal, resource).
//! - [`config`] / [`env`]: engine configuration with environment overrides.
//! - [`process`], [`stats`], [`tune`]: the narrow interfaces the engine
//!   consumes (command interpreter, socket tuning) or produces to
//!   (statistics sink).
//!
//! The engine itself lives in `nodeio-net` and depends on the traits here,
//! never the other way around.

pub mod header;
pub mod error;
pub mod env;
pub mod config;
pub mod process;
pub mod stats;
pub mod tune;

pub use config::IoConfig;
pub use error::{NetError, Result};
pub use header::{CommandHeader, HEADER_SIZE, ID_SIZE, TRANS_REPLY};
pub use process::{Disposition, Processor};
pub use stats::{CommandStat, NoopSink, StatsSink};
pub use tune::SocketTuner;
