//! Environment variable helpers for configuration overrides.
//!
//! ```ignore
//! use nodeio_core::env::{env_get, env_get_bool, env_get_duration_ms};
//!
//! let workers: usize = env_get("NODEIO_IO_THREADS", 4);
//! let nodelay = env_get_bool("NODEIO_TCP_NODELAY", true);
//! let timeout = env_get_duration_ms("NODEIO_REACTOR_TIMEOUT_MS", Duration::from_secs(1));
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Boolean flag. "1", "true", "yes", "on" are true; "0", "false", "no", "off"
/// are false; anything else keeps `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Millisecond count as a [`Duration`].
#[inline]
pub fn env_get_duration_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
