//! Session Module
//!
//! Identity wrapper around one accepted connection.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ConnectionError;
use crate::protocol::Message;
use crate::service::Connection;

// == Session ==
/// Per-connection identity handed to every hook.
///
/// The id is generated once from a random v4 UUID. The user id and the
/// settings store start empty and belong to application logic.
#[derive(Debug)]
pub struct Session {
    id: String,
    user_id: RwLock<String>,
    connection: Connection,
    settings: DashMap<String, Value>,
    connected_at: DateTime<Utc>,
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub user_id: String,
    pub peer_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    // == Constructor ==
    pub fn new(connection: Connection) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: RwLock::new(String::new()),
            connection,
            settings: DashMap::new(),
            connected_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.connection.peer_addr()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    // == User Binding ==
    /// Returns the bound user id, empty until [`Session::bind_user`].
    pub fn user_id(&self) -> String {
        self.user_id.read().clone()
    }

    pub fn bind_user(&self, user_id: impl Into<String>) {
        *self.user_id.write() = user_id.into();
    }

    // == Settings ==
    pub fn set_setting(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.settings.insert(key.into(), value)
    }

    pub fn setting(&self, key: &str) -> Option<Value> {
        self.settings.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove_setting(&self, key: &str) -> Option<Value> {
        self.settings.remove(key).map(|(_, value)| value)
    }

    // == Send ==
    /// Queues a message for this session's peer.
    pub async fn send(&self, message: &Message) -> Result<(), ConnectionError> {
        self.connection.send_message(message).await
    }

    /// Queues a message without waiting; for use inside synchronous hooks.
    pub fn try_send(&self, message: &Message) -> Result<(), ConnectionError> {
        self.connection.try_send_message(message)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            user_id: self.user_id(),
            peer_addr: self.peer_addr(),
            connected_at: self.connected_at,
        }
    }
}
