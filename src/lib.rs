//! Fish Cache - A framed TCP node with a byte-budgeted local store
//!
//! Provides a checksummed binary wire protocol, heartbeat-supervised
//! connections with per-connection sessions, and an in-memory cache with
//! LRU or unbounded backends.

pub mod cache;
pub mod config;
pub mod error;
pub mod protocol;
pub mod service;
pub mod tasks;

pub use cache::{LruCache, MapCache, Store};
pub use config::Config;
pub use protocol::Message;
pub use service::{Handlers, Service, Session};
pub use tasks::spawn_status_reporter;
