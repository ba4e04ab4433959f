//! Fish Cache - A framed TCP node with a byte-budgeted local store
//!
//! Runs the socket service with logging hooks and a node-local store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fish_cache::cache::{EvictReason, LruCache, MapCache, Store};
use fish_cache::error::ConnectionError;
use fish_cache::service::{Handlers, Service, StopReason};
use fish_cache::{spawn_status_reporter, Config};

/// Main entry point for the cache node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the node-local store and its status reporter
/// 4. Bind the socket service with logging hooks
/// 5. Serve until SIGINT/SIGTERM or an accept failure
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fish_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Fish Cache node");

    let config = Config::from_env();
    info!(
        "Configuration loaded: listen_addr={}, heartbeat_interval={}ms, queue_capacity={}, cache_limit={}B, status_interval={}s",
        config.listen_addr,
        config.heartbeat_interval_ms,
        config.queue_capacity,
        config.cache_limit_bytes,
        config.status_interval
    );

    let store = build_store(config.cache_limit_bytes);
    let reporter = (config.status_interval > 0).then(|| {
        spawn_status_reporter(store.clone(), Duration::from_secs(config.status_interval))
    });

    let service = Service::bind(&config, logging_handlers())
        .await
        .context("Failed to start socket service")?;

    tokio::spawn(shutdown_signal(service.clone()));

    let reason = service.serve().await?;
    match &reason {
        StopReason::Requested(_) => info!("Service finished: {}", reason),
        StopReason::AcceptFailed(_) => warn!("Service finished: {}", reason),
    }

    if let Some(handle) = reporter {
        handle.abort();
    }
    let status = serde_json::to_string(&store.status())?;
    info!("Final cache status: {}", status);

    Ok(())
}

fn build_store(limit_bytes: u64) -> Arc<dyn Store<Bytes>> {
    if limit_bytes == 0 {
        info!("Using unbounded map store");
        return Arc::new(MapCache::new(0));
    }
    info!("Using LRU store with a {} byte budget", limit_bytes);
    Arc::new(
        LruCache::new(limit_bytes).with_evict_hook(|key, value: &Bytes, reason| {
            if reason == EvictReason::Capacity {
                debug!(key, bytes = value.len(), "Evicted to fit the byte budget");
            }
        }),
    )
}

fn logging_handlers() -> Handlers {
    Handlers::new()
        .on_connect(|session| {
            info!(session = %session.id(), peer = %session.peer_addr(), "Client connected");
        })
        .on_message(|session, message| {
            debug!(
                session = %session.id(),
                opcode = message.opcode(),
                bytes = message.payload().len(),
                "Message received"
            );
        })
        .on_disconnect(|session, err: &ConnectionError| {
            info!(session = %session.id(), "Client disconnected: {}", err);
        })
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM) and stops the service.
async fn shutdown_signal(service: Service) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => "received Ctrl+C",
        _ = terminate => "received SIGTERM",
    };
    info!("{}, initiating shutdown...", reason);
    service.stop(reason);
}
