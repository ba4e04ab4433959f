//! Service Module
//!
//! Connection lifecycle on top of the frame protocol: per-connection read
//! and write pumps, sessions, hooks and the listening service.

mod connection;
mod handlers;
mod server;
mod session;

pub use connection::{
    read_frame, Connection, ConnectionEvents, ConnectionSettings, HeartbeatConfig,
    DEFAULT_QUEUE_CAPACITY,
};
pub use handlers::{ConnectHook, DisconnectHook, Handlers, MessageHook};
pub use server::{Service, ServiceStatus, StopReason};
pub use session::{Session, SessionInfo};
