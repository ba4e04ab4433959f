//! Integration Tests for the Socket Service
//!
//! Drives a real listener over loopback TCP and checks hook ordering,
//! heartbeats, integrity failures and shutdown.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time;

use fish_cache::error::{ConnectionError, ProtocolError, ServiceError};
use fish_cache::service::{read_frame, Handlers, Service, ServiceStatus, StopReason};
use fish_cache::{Config, Message};

const TEST_TIMEOUT: Duration = Duration::from_secs(3);

// == Helper Types ==

#[derive(Debug, Clone, PartialEq)]
enum Ending {
    PeerClosed,
    Timeout,
    Integrity,
    Closed,
    Shutdown,
    Other(String),
}

#[derive(Debug)]
enum Event {
    Connected(String),
    Received(String, Message),
    Disconnected(String, Ending),
}

fn ending(err: &ConnectionError) -> Ending {
    match err {
        ConnectionError::PeerClosed => Ending::PeerClosed,
        ConnectionError::Timeout(_) => Ending::Timeout,
        ConnectionError::Protocol(ProtocolError::Integrity { .. }) => Ending::Integrity,
        ConnectionError::Closed => Ending::Closed,
        ConnectionError::Shutdown => Ending::Shutdown,
        other => Ending::Other(other.to_string()),
    }
}

// == Helper Functions ==

fn test_config() -> Config {
    Config {
        listen_addr: "127.0.0.1:0".to_string(),
        ..Config::default()
    }
}

fn recording_handlers(events: UnboundedSender<Event>) -> Handlers {
    let on_connect = events.clone();
    let on_message = events.clone();
    Handlers::new()
        .on_connect(move |session| {
            let _ = on_connect.send(Event::Connected(session.id().to_string()));
        })
        .on_message(move |session, message| {
            // Opcode 99 asks the service to drop the session.
            if message.opcode() == 99 {
                session.connection().close();
            }
            let _ = on_message.send(Event::Received(session.id().to_string(), message));
        })
        .on_disconnect(move |session, err| {
            let _ = events.send(Event::Disconnected(session.id().to_string(), ending(err)));
        })
}

async fn start(
    config: Config,
) -> (
    Service,
    JoinHandle<Result<StopReason, ServiceError>>,
    UnboundedReceiver<Event>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let service = Service::bind(&config, recording_handlers(tx)).await.unwrap();
    let server = service.clone();
    let serving = tokio::spawn(async move { server.serve().await });
    (service, serving, rx)
}

async fn connect(service: &Service) -> TcpStream {
    TcpStream::connect(service.local_addr()).await.unwrap()
}

async fn next_event(events: &mut UnboundedReceiver<Event>) -> Event {
    time::timeout(TEST_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a hook")
        .expect("hook channel closed")
}

async fn expect_connected(events: &mut UnboundedReceiver<Event>) -> String {
    match next_event(events).await {
        Event::Connected(id) => id,
        other => panic!("expected connect, got {:?}", other),
    }
}

async fn expect_disconnected(events: &mut UnboundedReceiver<Event>) -> (String, Ending) {
    match next_event(events).await {
        Event::Disconnected(id, ending) => (id, ending),
        other => panic!("expected disconnect, got {:?}", other),
    }
}

async fn send(stream: &mut TcpStream, opcode: i32, payload: &'static [u8]) {
    let frame = Message::new(opcode, payload).encode().unwrap();
    stream.write_all(&frame).await.unwrap();
}

async fn wait_for_sessions(service: &Service, count: usize) {
    time::timeout(TEST_TIMEOUT, async {
        while service.session_count() != count {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached the expected size");
}

async fn shutdown(service: Service, serving: JoinHandle<Result<StopReason, ServiceError>>) {
    service.stop("test finished");
    let reason = time::timeout(TEST_TIMEOUT, serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(reason, StopReason::Requested(_)));
}

// == Message Delivery ==

#[tokio::test]
async fn test_message_delivered_then_peer_close_reported_once() {
    let (service, serving, mut events) = start(test_config()).await;
    let mut client = connect(&service).await;

    let id = expect_connected(&mut events).await;
    send(&mut client, 1, b"hello").await;

    match next_event(&mut events).await {
        Event::Received(from, message) => {
            assert_eq!(from, id);
            assert_eq!(message.opcode(), 1);
            assert_eq!(message.payload(), &Bytes::from_static(b"hello"));
        }
        other => panic!("expected message, got {:?}", other),
    }

    drop(client);
    assert_eq!(expect_disconnected(&mut events).await, (id, Ending::PeerClosed));
    wait_for_sessions(&service, 0).await;

    let extra = time::timeout(Duration::from_millis(200), events.recv()).await;
    assert!(extra.is_err(), "disconnect must be reported once");

    shutdown(service, serving).await;
}

#[tokio::test]
async fn test_messages_keep_arrival_order() {
    let (service, serving, mut events) = start(test_config()).await;
    let mut client = connect(&service).await;
    expect_connected(&mut events).await;

    for opcode in 10..20 {
        send(&mut client, opcode, b"payload").await;
    }
    for opcode in 10..20 {
        match next_event(&mut events).await {
            Event::Received(_, message) => assert_eq!(message.opcode(), opcode),
            other => panic!("expected message, got {:?}", other),
        }
    }

    shutdown(service, serving).await;
}

#[tokio::test]
async fn test_echo_reply_from_message_hook() {
    let config = test_config();
    let handlers = Handlers::new().on_message(|session, message| {
        let reply = Message::new(message.opcode() + 1, message.payload().clone());
        session.try_send(&reply).unwrap();
    });
    let service = Service::bind(&config, handlers).await.unwrap();
    let server = service.clone();
    let serving = tokio::spawn(async move { server.serve().await });

    let mut client = connect(&service).await;
    send(&mut client, 41, b"ping").await;

    let reply = time::timeout(TEST_TIMEOUT, read_frame(&mut client))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.opcode(), 42);
    assert_eq!(&reply.payload()[..], b"ping");
    assert!(reply.is_valid());

    shutdown(service, serving).await;
}

// == Registry ==

#[tokio::test]
async fn test_registry_tracks_live_sessions() {
    let (service, serving, mut events) = start(test_config()).await;

    let first = connect(&service).await;
    let first_id = expect_connected(&mut events).await;
    let _second = connect(&service).await;
    let second_id = expect_connected(&mut events).await;

    assert_ne!(first_id, second_id);
    assert_eq!(service.session_count(), 2);
    assert_eq!(service.session_infos().len(), 2);

    let session = service.session(&first_id).unwrap();
    session.bind_user("alice");
    assert_eq!(service.session(&first_id).unwrap().user_id(), "alice");

    drop(first);
    assert_eq!(expect_disconnected(&mut events).await.0, first_id);
    wait_for_sessions(&service, 1).await;
    assert!(service.session(&first_id).is_none());
    assert!(service.session(&second_id).is_some());

    shutdown(service, serving).await;
}

#[tokio::test]
async fn test_local_close_from_hook() {
    let (service, serving, mut events) = start(test_config()).await;
    let mut client = connect(&service).await;
    let id = expect_connected(&mut events).await;

    send(&mut client, 99, b"").await;
    assert!(matches!(next_event(&mut events).await, Event::Received(_, _)));
    assert_eq!(expect_disconnected(&mut events).await, (id, Ending::Closed));

    let read = time::timeout(TEST_TIMEOUT, read_frame(&mut client)).await.unwrap();
    assert!(matches!(read, Err(ConnectionError::PeerClosed)));

    shutdown(service, serving).await;
}

// == Heartbeats ==

#[tokio::test]
async fn test_heartbeats_flow_but_never_reach_message_hook() {
    let config = Config {
        heartbeat_interval_ms: 50,
        heartbeat_timeout_ms: 1000,
        ..test_config()
    };
    let (service, serving, mut events) = start(config).await;
    let mut client = connect(&service).await;
    expect_connected(&mut events).await;

    let beat = time::timeout(TEST_TIMEOUT, read_frame(&mut client))
        .await
        .unwrap()
        .unwrap();
    assert!(beat.is_heartbeat());
    assert!(beat.payload().is_empty());

    let frame = Message::heartbeat().encode().unwrap();
    client.write_all(&frame).await.unwrap();
    send(&mut client, 7, b"real").await;

    match next_event(&mut events).await {
        Event::Received(_, message) => assert_eq!(message.opcode(), 7),
        other => panic!("expected the real message, got {:?}", other),
    }

    shutdown(service, serving).await;
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let config = Config {
        heartbeat_interval_ms: 50,
        heartbeat_timeout_ms: 200,
        ..test_config()
    };
    let (service, serving, mut events) = start(config).await;
    let _client = connect(&service).await;
    let id = expect_connected(&mut events).await;

    assert_eq!(expect_disconnected(&mut events).await, (id, Ending::Timeout));
    wait_for_sessions(&service, 0).await;

    shutdown(service, serving).await;
}

// == Integrity ==

#[tokio::test]
async fn test_corrupted_frame_ends_session() {
    let (service, serving, mut events) = start(test_config()).await;
    let mut client = connect(&service).await;
    let id = expect_connected(&mut events).await;

    let mut frame = Message::new(1, &b"hello"[..]).encode().unwrap().to_vec();
    frame[8] ^= 0x01;
    client.write_all(&frame).await.unwrap();

    assert_eq!(expect_disconnected(&mut events).await, (id, Ending::Integrity));

    let read = time::timeout(TEST_TIMEOUT, read_frame(&mut client)).await.unwrap();
    assert!(matches!(read, Err(ConnectionError::PeerClosed)));

    shutdown(service, serving).await;
}

// == Lifecycle ==

#[tokio::test]
async fn test_stop_shuts_down_every_session() {
    let (service, serving, mut events) = start(test_config()).await;
    let mut first = connect(&service).await;
    let mut second = connect(&service).await;
    expect_connected(&mut events).await;
    expect_connected(&mut events).await;

    service.stop("maintenance");
    let reason = time::timeout(TEST_TIMEOUT, serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(reason, StopReason::Requested(ref r) if r == "maintenance"));

    // serve returns only after every disconnect hook has run
    for _ in 0..2 {
        assert_eq!(expect_disconnected(&mut events).await.1, Ending::Shutdown);
    }
    assert_eq!(service.status(), ServiceStatus::Stopped);
    assert_eq!(service.session_count(), 0);

    for client in [&mut first, &mut second] {
        let read = time::timeout(TEST_TIMEOUT, read_frame(client)).await.unwrap();
        assert!(matches!(read, Err(ConnectionError::PeerClosed)));
    }
}

#[tokio::test]
async fn test_serve_requires_inited_service() {
    let (service, serving, _events) = start(test_config()).await;

    time::timeout(TEST_TIMEOUT, async {
        while service.status() != ServiceStatus::Running {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(matches!(
        service.serve().await,
        Err(ServiceError::InvalidState(ServiceStatus::Running))
    ));

    shutdown(service.clone(), serving).await;
    assert!(matches!(
        service.serve().await,
        Err(ServiceError::InvalidState(ServiceStatus::Stopped))
    ));
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let first = Service::bind(&test_config(), Handlers::new()).await.unwrap();
    assert_eq!(first.status(), ServiceStatus::Inited);

    let taken = Config {
        listen_addr: first.local_addr().to_string(),
        ..Config::default()
    };
    let err = Service::bind(&taken, Handlers::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Bind { ref addr, .. } if *addr == taken.listen_addr));
}
