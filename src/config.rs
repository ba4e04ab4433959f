//! Configuration Module
//!
//! Handles loading and managing node configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::service::{ConnectionSettings, HeartbeatConfig};

/// Node configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the service listens on
    pub listen_addr: String,
    /// Heartbeat send interval in milliseconds, 0 disables heartbeats
    pub heartbeat_interval_ms: u64,
    /// Read deadline in milliseconds while heartbeats are enabled,
    /// 0 means three heartbeat intervals
    pub heartbeat_timeout_ms: u64,
    /// Depth of each connection's inbound and outbound queues
    pub queue_capacity: usize,
    /// Value byte budget of the node-local store, 0 selects the unbounded backend
    pub cache_limit_bytes: u64,
    /// Cache status report interval in seconds, 0 disables the reporter
    pub status_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `LISTEN_ADDR` - Listen address (default: 0.0.0.0:8889)
    /// - `HEARTBEAT_INTERVAL_MS` - Heartbeat interval (default: 0, disabled)
    /// - `HEARTBEAT_TIMEOUT_MS` - Read deadline (default: 0, three intervals)
    /// - `QUEUE_CAPACITY` - Per-connection queue depth (default: 100)
    /// - `CACHE_LIMIT_BYTES` - Store value budget (default: 64 MiB)
    /// - `STATUS_INTERVAL` - Status report frequency in seconds (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            heartbeat_interval_ms: env_or("HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval_ms),
            heartbeat_timeout_ms: env_or("HEARTBEAT_TIMEOUT_MS", defaults.heartbeat_timeout_ms),
            queue_capacity: env_or("QUEUE_CAPACITY", defaults.queue_capacity).max(1),
            cache_limit_bytes: env_or("CACHE_LIMIT_BYTES", defaults.cache_limit_bytes),
            status_interval: env_or("STATUS_INTERVAL", defaults.status_interval),
        }
    }

    /// Heartbeat timing with the timeout default applied.
    pub fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig::new(
            Duration::from_millis(self.heartbeat_interval_ms),
            Duration::from_millis(self.heartbeat_timeout_ms),
        )
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            heartbeat: self.heartbeat(),
            queue_capacity: self.queue_capacity.max(1),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8889".to_string(),
            heartbeat_interval_ms: 0,
            heartbeat_timeout_ms: 0,
            queue_capacity: 100,
            cache_limit_bytes: 64 * 1024 * 1024,
            status_interval: 30,
        }
    }
}
