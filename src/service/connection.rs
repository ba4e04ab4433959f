//! Connection Module
//!
//! One accepted byte stream driven by two independent tasks: a read pump
//! decoding frames into the inbound queue, and a write pump draining the
//! outbound queue and emitting heartbeats. Either pump reports at most one
//! terminal error and then stops.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{ConnectionError, ProtocolError};
use crate::protocol::{parse_frame_length, Message, LENGTH_PREFIX_LEN};

// == Public Constants ==
/// Default depth of the inbound and outbound queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Each pump reports at most one error.
const ERROR_CHANNEL_CAPACITY: usize = 2;

// == Heartbeat Config ==
/// Keepalive timing for one connection.
///
/// A zero interval disables both the heartbeat timer and the read deadline.
/// A zero timeout with a non-zero interval means three intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often a heartbeat frame is queued
    pub interval: Duration,
    /// How long a read may wait for a complete frame, zero for the default
    pub timeout: Duration,
}

impl HeartbeatConfig {
    /// Number of intervals a read may wait when no timeout is given.
    pub const DEFAULT_TIMEOUT_INTERVALS: u32 = 3;

    /// Creates a heartbeat config with the timeout default applied.
    ///
    /// # Arguments
    /// * `interval` - Heartbeat send interval, zero disables heartbeats
    /// * `timeout` - Read deadline, zero selects three intervals
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let config = Self { interval, timeout };
        Self {
            timeout: config.effective_timeout(),
            ..config
        }
    }

    pub fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }

    pub fn enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Read deadline actually applied while heartbeats are enabled.
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            self.interval * Self::DEFAULT_TIMEOUT_INTERVALS
        } else {
            self.timeout
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

// == Connection Settings ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub heartbeat: HeartbeatConfig,
    pub queue_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::disabled(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// == Connection ==
/// Handle to a live connection.
///
/// Cloning the handle is cheap; all clones share the same outbound queue
/// and cancellation scope.
#[derive(Debug, Clone)]
pub struct Connection {
    peer_addr: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

/// Receiving side of a connection, consumed by the owning control loop.
#[derive(Debug)]
pub struct ConnectionEvents {
    pub(crate) inbound: mpsc::Receiver<Message>,
    pub(crate) errors: mpsc::Receiver<ConnectionError>,
    pumps: [JoinHandle<()>; 2],
}

impl Connection {
    // == Constructor ==
    /// Splits `stream` and spawns its read and write pumps.
    ///
    /// Both pumps stop when `cancel` fires, so passing a child of a wider
    /// scope ties the connection's lifetime to it.
    pub fn spawn<S>(
        stream: S,
        peer_addr: SocketAddr,
        settings: ConnectionSettings,
        cancel: CancellationToken,
    ) -> (Self, ConnectionEvents)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let capacity = settings.queue_capacity.max(1);
        let (reader, writer) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        let read = tokio::spawn(read_pump(
            reader,
            settings.heartbeat,
            inbound_tx,
            error_tx.clone(),
            cancel.clone(),
        ));
        let write = tokio::spawn(write_pump(
            writer,
            settings.heartbeat,
            outbound_rx,
            outbound_tx.clone(),
            error_tx,
            cancel.clone(),
        ));

        let connection = Self {
            peer_addr,
            outbound: outbound_tx,
            cancel,
        };
        let events = ConnectionEvents {
            inbound: inbound_rx,
            errors: error_rx,
            pumps: [read, write],
        };
        (connection, events)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    // == Send ==
    /// Encodes `message` and queues it, waiting while the queue is full.
    pub async fn send_message(&self, message: &Message) -> Result<(), ConnectionError> {
        let frame = message.encode()?;
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    /// Encodes `message` and queues it without waiting.
    ///
    /// Usable from synchronous hooks; fails with
    /// [`ConnectionError::OutboundFull`] instead of blocking.
    pub fn try_send_message(&self, message: &Message) -> Result<(), ConnectionError> {
        let frame = message.encode()?;
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => ConnectionError::OutboundFull,
            TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    // == Close ==
    /// Stops both pumps, which disarms the heartbeat and shuts the socket.
    ///
    /// Safe to call more than once.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(peer = %self.peer_addr, "Closing connection");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl ConnectionEvents {
    /// Waits for both pumps to exit.
    pub(crate) async fn join(self) {
        for pump in self.pumps {
            if let Err(err) = pump.await {
                warn!("Connection pump failed: {}", err);
            }
        }
    }
}

// == Frame Reader ==
/// Reads one length-prefixed frame and decodes it.
///
/// End of stream before a frame starts is [`ConnectionError::PeerClosed`];
/// end of stream anywhere inside a frame, length prefix included, is a
/// truncated-frame protocol error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Message, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    if let Err(err) = reader.read_exact(&mut prefix[..1]).await {
        return Err(match err.kind() {
            io::ErrorKind::UnexpectedEof => ConnectionError::PeerClosed,
            _ => err.into(),
        });
    }
    if let Err(err) = reader.read_exact(&mut prefix[1..]).await {
        return Err(match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                ProtocolError::Frame("stream ended inside a length prefix".to_string()).into()
            }
            _ => err.into(),
        });
    }

    let body_len = parse_frame_length(prefix)?;
    let mut body = BytesMut::zeroed(body_len);
    if let Err(err) = reader.read_exact(&mut body).await {
        return Err(match err.kind() {
            io::ErrorKind::UnexpectedEof => ProtocolError::Frame(format!(
                "stream ended inside a {} byte frame body",
                body_len
            ))
            .into(),
            _ => err.into(),
        });
    }

    Ok(Message::decode(body.freeze())?)
}

async fn read_frame_with_deadline<R>(
    reader: &mut R,
    heartbeat: HeartbeatConfig,
) -> Result<Message, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    if !heartbeat.enabled() {
        return read_frame(reader).await;
    }
    let deadline = heartbeat.effective_timeout();
    match time::timeout(deadline, read_frame(reader)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::Timeout(deadline)),
    }
}

fn report(errors: &mpsc::Sender<ConnectionError>, err: ConnectionError) {
    if let Err(dropped) = errors.try_send(err) {
        debug!("Terminal error not delivered: {:?}", dropped);
    }
}

// == Read Pump ==
pub(crate) async fn read_pump<R>(
    mut reader: R,
    heartbeat: HeartbeatConfig,
    inbound: mpsc::Sender<Message>,
    errors: mpsc::Sender<ConnectionError>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = read_frame_with_deadline(&mut reader, heartbeat) => result,
        };

        let message = match result {
            Ok(message) => message,
            Err(err) => {
                // Never read again after a terminal error.
                report(&errors, err);
                break;
            }
        };
        trace!(
            opcode = message.opcode(),
            bytes = message.payload().len(),
            "Frame received"
        );

        // Blocks while the inbound queue is full.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = inbound.send(message) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

// == Write Pump ==
pub(crate) async fn write_pump<W>(
    mut writer: W,
    heartbeat: HeartbeatConfig,
    mut outbound: mpsc::Receiver<Bytes>,
    requeue: mpsc::Sender<Bytes>,
    errors: mpsc::Sender<ConnectionError>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let timer = time::sleep(heartbeat.interval);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                let written = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    written = write_frame(&mut writer, &frame) => written,
                };
                if let Err(err) = written {
                    report(&errors, err.into());
                    break;
                }
                trace!(bytes = frame.len(), "Frame written");
            }
            _ = &mut timer, if heartbeat.enabled() => {
                match Message::heartbeat().encode() {
                    Ok(frame) => {
                        // A full queue already keeps the link busy.
                        if requeue.try_send(frame).is_err() {
                            debug!("Outbound queue full, skipping heartbeat");
                        }
                    }
                    Err(err) => {
                        report(&errors, err.into());
                        break;
                    }
                }
                timer.as_mut().reset(Instant::now() + heartbeat.interval);
            }
        }
    }

    if let Err(err) = writer.shutdown().await {
        trace!("Socket shutdown failed: {}", err);
    }
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}
