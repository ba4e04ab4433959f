//! Socket Service
//!
//! Owns the listener, runs the accept loop and one control task per
//! connection, and keeps the registry of live sessions.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{ConnectionError, ServiceError};
use crate::protocol::Message;
use crate::service::{Connection, ConnectionSettings, Handlers, Session, SessionInfo};

// == Service Status ==
/// Lifecycle of a service. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Inited,
    Running,
    Stopped,
}

// == Stop Reason ==
/// Why [`Service::serve`] returned.
#[derive(Debug)]
pub enum StopReason {
    /// [`Service::stop`] was called with this reason
    Requested(String),
    /// The listener stopped accepting connections
    AcceptFailed(io::Error),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested(reason) => write!(f, "stop requested: {}", reason),
            StopReason::AcceptFailed(err) => write!(f, "accept failed: {}", err),
        }
    }
}

// == Service ==
/// Listening service; clones share the same listener and registry.
#[derive(Clone)]
pub struct Service {
    shared: Arc<Shared>,
}

struct Shared {
    local_addr: SocketAddr,
    settings: ConnectionSettings,
    handlers: Handlers,
    sessions: DashMap<String, Arc<Session>>,
    status: Mutex<ServiceStatus>,
    listener: Mutex<Option<TcpListener>>,
    stop_tx: mpsc::Sender<StopReason>,
    stop_rx: Mutex<Option<mpsc::Receiver<StopReason>>>,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl Service {
    // == Constructor ==
    /// Binds the listening socket.
    ///
    /// Bind failures are returned here rather than from [`Service::serve`].
    ///
    /// # Arguments
    /// * `config` - Listen address and per-connection settings
    /// * `handlers` - Hooks invoked for every session
    ///
    /// # Returns
    /// An `Inited` service, or [`ServiceError::Bind`] if the address cannot
    /// be bound.
    pub async fn bind(config: &Config, handlers: Handlers) -> Result<Self, ServiceError> {
        let bind_error = |source| ServiceError::Bind {
            addr: config.listen_addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        let (stop_tx, stop_rx) = mpsc::channel(1);

        info!(addr = %local_addr, "Listener bound");
        Ok(Self {
            shared: Arc::new(Shared {
                local_addr,
                settings: config.connection_settings(),
                handlers,
                sessions: DashMap::new(),
                status: Mutex::new(ServiceStatus::Inited),
                listener: Mutex::new(Some(listener)),
                stop_tx,
                stop_rx: Mutex::new(Some(stop_rx)),
                root: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn status(&self) -> ServiceStatus {
        *self.shared.status.lock()
    }

    // == Registry ==
    pub fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.shared
            .sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.len()
    }

    pub fn session_infos(&self) -> Vec<SessionInfo> {
        self.shared
            .sessions
            .iter()
            .map(|entry| entry.value().info())
            .collect()
    }

    // == Serve ==
    /// Accepts connections until a stop signal arrives.
    ///
    /// On stop, cancels every connection scope, closes the listener and
    /// waits until each connection's disconnect hook has run. Only an
    /// `Inited` service can be served.
    pub async fn serve(&self) -> Result<StopReason, ServiceError> {
        let (listener, mut stop_rx) = {
            let mut status = self.shared.status.lock();
            if *status != ServiceStatus::Inited {
                return Err(ServiceError::InvalidState(*status));
            }
            let listener = self.shared.listener.lock().take();
            let stop_rx = self.shared.stop_rx.lock().take();
            match (listener, stop_rx) {
                (Some(listener), Some(stop_rx)) => {
                    *status = ServiceStatus::Running;
                    (listener, stop_rx)
                }
                _ => return Err(ServiceError::InvalidState(*status)),
            }
        };
        info!(addr = %self.shared.local_addr, "Service running");

        let accept = tokio::spawn(accept_loop(Arc::clone(&self.shared), listener));

        let reason = match stop_rx.recv().await {
            Some(reason) => reason,
            None => StopReason::Requested("stop channel closed".to_string()),
        };
        info!(%reason, "Service stopping");

        self.shared.root.cancel();
        if let Err(err) = accept.await {
            warn!("Accept loop failed: {}", err);
        }
        self.shared.tracker.close();
        self.shared.tracker.wait().await;

        *self.shared.status.lock() = ServiceStatus::Stopped;
        info!("Service stopped");
        Ok(reason)
    }

    // == Stop ==
    /// Publishes a stop signal; [`Service::serve`] returns with it.
    pub fn stop(&self, reason: impl Into<String>) {
        let reason = StopReason::Requested(reason.into());
        if let Err(err) = self.shared.stop_tx.try_send(reason) {
            debug!("Stop already pending: {}", err);
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("local_addr", &self.shared.local_addr)
            .field("status", &self.status())
            .field("sessions", &self.session_count())
            .field("handlers", &self.shared.handlers)
            .finish()
    }
}

// == Accept Loop ==
async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shared.root.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                let conn_shared = Arc::clone(&shared);
                shared
                    .tracker
                    .spawn(handle_connection(conn_shared, stream, peer_addr));
            }
            Err(err) => {
                warn!("Accept failed: {}", err);
                if let Err(dropped) = shared.stop_tx.try_send(StopReason::AcceptFailed(err)) {
                    debug!("Stop already pending: {}", dropped);
                }
                break;
            }
        }
    }
    debug!("Accept loop finished");
}

// == Connection Control Loop ==
async fn handle_connection(shared: Arc<Shared>, stream: TcpStream, peer_addr: SocketAddr) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(peer = %peer_addr, "Failed to set TCP_NODELAY: {}", err);
    }

    let scope = shared.root.child_token();
    let (connection, mut events) =
        Connection::spawn(stream, peer_addr, shared.settings, scope.clone());
    let session = Arc::new(Session::new(connection));
    let id = session.id().to_string();

    shared.sessions.insert(id.clone(), Arc::clone(&session));
    info!(session = %id, peer = %peer_addr, "Session opened");
    shared.handlers.connected(&session);

    let err = loop {
        tokio::select! {
            biased;
            Some(err) = events.errors.recv() => {
                // Frames read before the failure are still delivered in order.
                while let Ok(message) = events.inbound.try_recv() {
                    dispatch(&shared, &session, message);
                }
                break err;
            }
            _ = scope.cancelled() => {
                break if shared.root.is_cancelled() {
                    ConnectionError::Shutdown
                } else {
                    ConnectionError::Closed
                };
            }
            Some(message) = events.inbound.recv() => dispatch(&shared, &session, message),
            else => break ConnectionError::Closed,
        }
    };

    shared.handlers.disconnected(&session, &err);

    session.connection().close();
    events.join().await;
    shared.sessions.remove(&id);

    if err.is_peer_fault() && !matches!(err, ConnectionError::PeerClosed) {
        warn!(session = %id, peer = %peer_addr, "Session closed: {}", err);
    } else {
        info!(session = %id, peer = %peer_addr, "Session closed: {}", err);
    }
}

fn dispatch(shared: &Shared, session: &Arc<Session>, message: Message) {
    if message.is_heartbeat() {
        trace!(session = %session.id(), "Heartbeat received");
        return;
    }
    shared.handlers.received(session, message);
}
