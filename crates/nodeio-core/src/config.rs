//! I/O subsystem configuration.
//!
//! Library defaults, with optional environment overrides:
//!
//! ```rust,ignore
//! use nodeio_core::IoConfig;
//!
//! // Defaults with env overrides
//! let config = IoConfig::from_env();
//!
//! // Or customize programmatically
//! let config = IoConfig::default()
//!     .io_thread_num(8)
//!     .reactor_timeout(Duration::from_millis(200));
//! ```

use std::time::Duration;

use crate::env::{env_get, env_get_bool, env_get_duration_ms};
use crate::error::{NetError, Result};

/// Upper bound on worker threads.
pub const MAX_IO_THREADS: usize = 256;

/// I/O subsystem configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Number of worker threads processing inbound requests
    pub io_thread_num: usize,
    /// Upper bound of one multiplexer wait; also the reactor's exit-flag latency
    pub reactor_timeout: Duration,
    /// Upper bound of one worker condvar wait; also the workers' exit-flag latency
    pub worker_timeout: Duration,
    /// Readiness events fetched per multiplexer wait
    pub max_events: usize,
    /// Set TCP_NODELAY on accepted and attached sockets
    pub tcp_nodelay: bool,
    /// Set SO_KEEPALIVE on accepted and attached sockets
    pub keepalive: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            io_thread_num: (cpus / 2).clamp(2, 8),
            reactor_timeout: Duration::from_millis(1000),
            worker_timeout: Duration::from_millis(1000),
            max_events: 64,
            tcp_nodelay: true,
            keepalive: true,
        }
    }
}

impl IoConfig {
    /// Defaults with environment overrides applied.
    ///
    /// Environment variables (all optional):
    /// - `NODEIO_IO_THREADS` - Number of worker threads
    /// - `NODEIO_REACTOR_TIMEOUT_MS` - Multiplexer wait bound
    /// - `NODEIO_WORKER_TIMEOUT_MS` - Worker wait bound
    /// - `NODEIO_MAX_EVENTS` - Events per multiplexer wait
    /// - `NODEIO_TCP_NODELAY` - TCP_NODELAY on new sockets (0/1)
    /// - `NODEIO_KEEPALIVE` - SO_KEEPALIVE on new sockets (0/1)
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            io_thread_num: env_get("NODEIO_IO_THREADS", d.io_thread_num),
            reactor_timeout: env_get_duration_ms("NODEIO_REACTOR_TIMEOUT_MS", d.reactor_timeout),
            worker_timeout: env_get_duration_ms("NODEIO_WORKER_TIMEOUT_MS", d.worker_timeout),
            max_events: env_get("NODEIO_MAX_EVENTS", d.max_events),
            tcp_nodelay: env_get_bool("NODEIO_TCP_NODELAY", d.tcp_nodelay),
            keepalive: env_get_bool("NODEIO_KEEPALIVE", d.keepalive),
        }
    }

    /// Set number of worker threads
    pub fn io_thread_num(mut self, n: usize) -> Self {
        self.io_thread_num = n;
        self
    }

    /// Set the multiplexer wait bound
    pub fn reactor_timeout(mut self, d: Duration) -> Self {
        self.reactor_timeout = d;
        self
    }

    /// Set the worker wait bound
    pub fn worker_timeout(mut self, d: Duration) -> Self {
        self.worker_timeout = d;
        self
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    pub fn tcp_nodelay(mut self, enable: bool) -> Self {
        self.tcp_nodelay = enable;
        self
    }

    pub fn keepalive(mut self, enable: bool) -> Self {
        self.keepalive = enable;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.io_thread_num == 0 {
            return Err(NetError::Config("io_thread_num must be at least 1"));
        }
        if self.io_thread_num > MAX_IO_THREADS {
            return Err(NetError::Config("io_thread_num exceeds maximum"));
        }
        if self.reactor_timeout.is_zero() {
            return Err(NetError::Config("reactor_timeout must be non-zero"));
        }
        if self.worker_timeout.is_zero() {
            return Err(NetError::Config("worker_timeout must be non-zero"));
        }
        if self.max_events == 0 {
            return Err(NetError::Config("max_events must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = IoConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.io_thread_num >= 2 && config.io_thread_num <= 8);
        assert_eq!(config.reactor_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_builder() {
        let config = IoConfig::default()
            .io_thread_num(3)
            .reactor_timeout(Duration::from_millis(10))
            .worker_timeout(Duration::from_millis(20))
            .max_events(1)
            .tcp_nodelay(false)
            .keepalive(false);
        assert_eq!(config.io_thread_num, 3);
        assert_eq!(config.reactor_timeout, Duration::from_millis(10));
        assert_eq!(config.worker_timeout, Duration::from_millis(20));
        assert_eq!(config.max_events, 1);
        assert!(!config.tcp_nodelay);
        assert!(!config.keepalive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        assert!(IoConfig::default().io_thread_num(0).validate().is_err());
        assert!(IoConfig::default().io_thread_num(MAX_IO_THREADS + 1).validate().is_err());
        assert!(IoConfig::default().reactor_timeout(Duration::ZERO).validate().is_err());
        assert!(IoConfig::default().worker_timeout(Duration::ZERO).validate().is_err());
        assert!(IoConfig::default().max_events(0).validate().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("NODEIO_IO_THREADS", "5");
        std::env::set_var("NODEIO_REACTOR_TIMEOUT_MS", "50");
        std::env::set_var("NODEIO_TCP_NODELAY", "0");
        let config = IoConfig::from_env();
        std::env::remove_var("NODEIO_IO_THREADS");
        std::env::remove_var("NODEIO_REACTOR_TIMEOUT_MS");
        std::env::remove_var("NODEIO_TCP_NODELAY");

        assert_eq!(config.io_thread_num, 5);
        assert_eq!(config.reactor_timeout, Duration::from_millis(50));
        assert!(!config.tcp_nodelay);
        assert_eq!(config.max_events, IoConfig::default().max_events);
    }
}
