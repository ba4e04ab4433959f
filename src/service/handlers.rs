//! Service Hooks
//!
//! Lifecycle and message callbacks registered by the application.
//! Hooks run on the connection's control task, so a slow hook delays
//! only that connection's next message.

use std::fmt;
use std::sync::Arc;

use crate::error::ConnectionError;
use crate::protocol::Message;
use crate::service::Session;

pub type ConnectHook = Arc<dyn Fn(&Arc<Session>) + Send + Sync>;
pub type MessageHook = Arc<dyn Fn(&Arc<Session>, Message) + Send + Sync>;
pub type DisconnectHook = Arc<dyn Fn(&Arc<Session>, &ConnectionError) + Send + Sync>;

/// Set of hooks passed to [`crate::service::Service::bind`].
///
/// Unset hooks are skipped.
#[derive(Clone, Default)]
pub struct Handlers {
    on_connect: Option<ConnectHook>,
    on_message: Option<MessageHook>,
    on_disconnect: Option<DisconnectHook>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once after the session is registered.
    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Session>) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    /// Called for every decoded, non-heartbeat message, in arrival order.
    pub fn on_message<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Session>, Message) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(hook));
        self
    }

    /// Called exactly once when the connection terminates.
    pub fn on_disconnect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Session>, &ConnectionError) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(hook));
        self
    }

    pub(crate) fn connected(&self, session: &Arc<Session>) {
        if let Some(hook) = &self.on_connect {
            hook(session);
        }
    }

    pub(crate) fn received(&self, session: &Arc<Session>, message: Message) {
        if let Some(hook) = &self.on_message {
            hook(session, message);
        }
    }

    pub(crate) fn disconnected(&self, session: &Arc<Session>, err: &ConnectionError) {
        if let Some(hook) = &self.on_disconnect {
            hook(session, err);
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}
